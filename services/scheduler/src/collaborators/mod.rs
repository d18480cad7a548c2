//! External collaborators the engine calls through traits.
//!
//! - [`Calendar`]: busy intervals per interviewer calendar
//! - [`InviteSender`]: invite issuance after a commit
//! - [`RankingAssist`]: optional reordering of the top candidates
//! - [`Clock`]: the current instant
//!
//! Reference adapters and test doubles live next to each trait.

mod assist;
mod calendar;
mod clock;
mod invite;

pub use assist::{AssistContext, AssistError, HttpRankingAssist, RankingAssist};
pub use calendar::{BusyInterval, Calendar, CalendarError, StaticCalendar};
pub use clock::{Clock, FixedClock, SystemClock};
pub use invite::{InviteError, InviteSender, LoggingInviteSender, MockInviteSender};
