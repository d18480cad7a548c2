//! # panelist-events
//!
//! Record types for the interview history ledger.
//!
//! ## Design Principles
//!
//! - Records are immutable once appended; the ledger is append-only
//! - A cancellation is a tombstone record pointing at the booking it cancels,
//!   never an in-place edit
//! - Every record carries the ISO week bucket of its scheduled instant,
//!   computed in the organization reference timezone by [`WeekBucket::of`]
//!
//! ## Record Kinds
//!
//! - `interview.booked`: an interviewer was committed to a slot
//! - `interview.cancelled`: tombstone for an earlier booking

mod error;
mod types;
mod week;

pub use error::EventError;
pub use types::*;
pub use week::WeekBucket;
