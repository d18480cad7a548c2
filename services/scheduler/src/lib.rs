//! Panelist scheduler.
//!
//! Decides who interviews a candidate and when. A request flows through the
//! [`DecisionPipeline`]:
//!
//! 1. [`AvailabilityResolver`] intersects working hours with calendar busy
//!    time for every active interviewer.
//! 2. [`CapacityGuard`] drops interviewers whose week is already full.
//! 3. [`Ranker`] orders the rest by workload deviation, specialty match and
//!    timezone overlap, optionally consulting a [`RankingAssist`].
//! 4. [`AssignmentRecorder`] reserves the ledger entry and sends the invite.
//!
//! The [`HistoryLedger`] is the single source of truth for both fairness and
//! weekly capacity.

pub mod availability;
pub mod capacity;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod hours;
pub mod ledger;
pub mod pipeline;
pub mod ranking;
pub mod recorder;
pub mod registry;
pub mod request;
pub mod workload;

pub use availability::{AvailabilityResolver, AvailabilitySlot, CandidateKey, Exclusion, Resolution};
pub use capacity::{CapacityDrop, CapacityGuard, GuardOutcome};
pub use collaborators::{
    AssistContext, AssistError, BusyInterval, Calendar, CalendarError, Clock, FixedClock,
    HttpRankingAssist, InviteError, InviteSender, LoggingInviteSender, MockInviteSender,
    RankingAssist, StaticCalendar, SystemClock,
};
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use hours::{Interval, WorkingHours};
pub use ledger::{AppendOutcome, FileLedger, HistoryLedger, InMemoryLedger, LedgerError};
pub use pipeline::{
    AbortReason, CancelHandle, CancelSignal, Collaborators, DecisionPipeline,
    NoAvailabilityReport, PipelineTrace, Preview, PreviewOutcome, RunOutcome, Stage, TraceEntry,
};
pub use ranking::{
    FairnessSnapshot, FairnessWindow, RankedCandidate, Ranker, RankingWeights, RuleBasedRanker,
};
pub use recorder::{Assignment, AssignmentRecorder, CommitOutcome};
pub use registry::{Interviewer, InterviewerRegistry, RegistryError, SpecialtyTag};
pub use request::{InterviewRequest, RequestError, SpecialtyMap};
pub use workload::WorkloadStats;
