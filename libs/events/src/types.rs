//! History record definitions.
//!
//! A [`HistoryRecord`] is one line of the append-only ledger. Records are keyed
//! by [`RecordKey`]: the interviewer, the scheduled instant, and whether the
//! record is a tombstone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use panelist_id::{AssignmentId, InterviewerId};
use serde::{Deserialize, Serialize};

use crate::{EventError, WeekBucket};

// =============================================================================
// Event Type Constants
// =============================================================================

/// Record type names as they appear in persisted ledgers.
pub mod event_types {
    pub const INTERVIEW_BOOKED: &str = "interview.booked";
    pub const INTERVIEW_CANCELLED: &str = "interview.cancelled";
}

// =============================================================================
// Record Kind
// =============================================================================

/// What a history record says happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RecordKind {
    /// An interviewer was committed to a slot.
    #[serde(rename = "interview.booked")]
    Booked {
        assignment_id: AssignmentId,
        duration_minutes: u32,
    },

    /// Tombstone for the booking with the same interviewer and instant.
    #[serde(rename = "interview.cancelled")]
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignment_id: Option<AssignmentId>,
        reason: String,
    },
}

impl RecordKind {
    /// The persisted type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            RecordKind::Booked { .. } => event_types::INTERVIEW_BOOKED,
            RecordKind::Cancelled { .. } => event_types::INTERVIEW_CANCELLED,
        }
    }
}

// =============================================================================
// Record Key
// =============================================================================

/// Idempotency key of a ledger record.
///
/// Appending a record whose key already exists is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub interviewer_id: InterviewerId,
    pub scheduled_at: DateTime<Utc>,
    pub tombstone: bool,
}

impl RecordKey {
    /// Key of the booking an interviewer holds at `scheduled_at`.
    pub fn booking(interviewer_id: InterviewerId, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            interviewer_id,
            scheduled_at,
            tombstone: false,
        }
    }

    /// Key of the tombstone cancelling that booking.
    pub fn tombstone_of(&self) -> Self {
        Self {
            tombstone: true,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}{}",
            self.interviewer_id,
            self.scheduled_at.to_rfc3339(),
            if self.tombstone { "#cancelled" } else { "" }
        )
    }
}

// =============================================================================
// History Record
// =============================================================================

/// One immutable entry of the interview history ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Interviewer the record is about.
    pub interviewer_id: InterviewerId,

    /// Start of the interview.
    pub scheduled_at: DateTime<Utc>,

    /// ISO week of `scheduled_at` in the reference timezone.
    pub week_bucket: WeekBucket,

    /// Specialty the interview was booked for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,

    /// When the record was written.
    pub recorded_at: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: RecordKind,
}

impl HistoryRecord {
    /// Builds a booking record, deriving the week bucket from `reference_tz`.
    pub fn booked(
        interviewer_id: InterviewerId,
        scheduled_at: DateTime<Utc>,
        reference_tz: Tz,
        assignment_id: AssignmentId,
        duration_minutes: u32,
    ) -> Self {
        Self {
            interviewer_id,
            scheduled_at,
            week_bucket: WeekBucket::of(scheduled_at, reference_tz),
            specialty: None,
            recorded_at: Utc::now(),
            kind: RecordKind::Booked {
                assignment_id,
                duration_minutes,
            },
        }
    }

    /// Sets the specialty tag.
    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Overrides the write timestamp.
    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }

    /// Builds the tombstone that cancels this booking.
    pub fn tombstone(
        &self,
        reason: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        let RecordKind::Booked { assignment_id, .. } = &self.kind else {
            return Err(EventError::NotABooking(self.key().to_string()));
        };

        Ok(Self {
            interviewer_id: self.interviewer_id.clone(),
            scheduled_at: self.scheduled_at,
            week_bucket: self.week_bucket,
            specialty: self.specialty.clone(),
            recorded_at,
            kind: RecordKind::Cancelled {
                assignment_id: Some(*assignment_id),
                reason: reason.into(),
            },
        })
    }

    /// Idempotency key for the ledger.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            interviewer_id: self.interviewer_id.clone(),
            scheduled_at: self.scheduled_at,
            tombstone: self.is_tombstone(),
        }
    }

    /// Returns true for cancellation records.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.kind, RecordKind::Cancelled { .. })
    }

    /// Assignment this record belongs to, when known.
    pub fn assignment_id(&self) -> Option<AssignmentId> {
        match &self.kind {
            RecordKind::Booked { assignment_id, .. } => Some(*assignment_id),
            RecordKind::Cancelled { assignment_id, .. } => *assignment_id,
        }
    }

    /// Checks that the stored bucket matches the one derived in `reference_tz`.
    pub fn verify_bucket(&self, reference_tz: Tz) -> Result<(), EventError> {
        let expected = WeekBucket::of(self.scheduled_at, reference_tz);
        if expected != self.week_bucket {
            return Err(EventError::BucketMismatch {
                expected: expected.to_string(),
                actual: self.week_bucket.to_string(),
            });
        }
        Ok(())
    }
}
