//! Interview history ledger.
//!
//! The ledger is the only shared mutable state in the scheduler. It is
//! append-only: bookings are never edited, cancellations are tombstones keyed
//! to the booking they cancel. Fairness and capacity are both computed from it.
//!
//! Two backends share one state machine ([`LedgerState`]):
//! - [`InMemoryLedger`] for tests and single-process runs
//! - [`FileLedger`] persisting a versioned JSON state file

mod file;
mod memory;

pub use file::FileLedger;
pub use memory::InMemoryLedger;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use panelist_events::{EventError, HistoryRecord, RecordKey, WeekBucket};
use panelist_id::{AssignmentId, InterviewerId};
use thiserror::Error;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The record is inconsistent (wrong week bucket, not a booking).
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] EventError),

    /// Cancellation referenced a booking the ledger does not hold.
    #[error("no booking for {0}")]
    BookingNotFound(String),

    /// The backing store failed. The in-memory state is unchanged.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// What an append or reservation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was written.
    Appended,

    /// An identical record already exists; nothing was written.
    AlreadyRecorded,

    /// Another assignment holds this interviewer at this instant.
    SlotTaken { held_by: Option<AssignmentId> },

    /// The interviewer's current week is full; nothing was written.
    OverCapacity { current_week: u32, max_per_week: u32 },
}

impl AppendOutcome {
    /// True when the record is durable after the call.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Appended | Self::AlreadyRecorded)
    }
}

/// Append-only history of interview bookings.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    /// Timezone week buckets are computed in.
    fn reference_tz(&self) -> Tz;

    /// Appends a record. Re-appending an existing key is a no-op.
    async fn append(&self, record: HistoryRecord) -> LedgerResult<AppendOutcome>;

    /// Checks the interviewer's current-week count against `max_per_week` and
    /// appends the booking in one critical section.
    async fn reserve(
        &self,
        record: HistoryRecord,
        max_per_week: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome>;

    /// Live bookings with `start <= scheduled_at < end`.
    async fn count_in_window(
        &self,
        interviewer_id: &InterviewerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<u32>;

    /// Live bookings in the ISO week that contains `now`.
    async fn count_in_current_week(
        &self,
        interviewer_id: &InterviewerId,
        now: DateTime<Utc>,
    ) -> LedgerResult<u32>;

    /// Appends a tombstone for the booking at `(interviewer_id, scheduled_at)`.
    async fn cancel(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome>;

    /// Snapshot of every record in key order.
    async fn records(&self) -> LedgerResult<Vec<HistoryRecord>>;
}

// =============================================================================
// Shared State
// =============================================================================

/// Record set plus the rules every backend applies to it.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    records: BTreeMap<RecordKey, HistoryRecord>,
}

impl LedgerState {
    pub(crate) fn from_records(records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }

    pub(crate) fn records(&self) -> Vec<HistoryRecord> {
        self.records.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Removes a record written by the last call; used to roll back a failed save.
    pub(crate) fn remove(&mut self, key: &RecordKey) {
        self.records.remove(key);
    }

    fn is_live(&self, record: &HistoryRecord) -> bool {
        !record.is_tombstone() && !self.records.contains_key(&record.key().tombstone_of())
    }

    fn live_bookings<'a>(
        &'a self,
        interviewer_id: &'a InterviewerId,
    ) -> impl Iterator<Item = &'a HistoryRecord> + 'a {
        self.records
            .values()
            .filter(move |r| &r.interviewer_id == interviewer_id && self.is_live(r))
    }

    /// Live bookings scheduled at or after `from`, earliest first.
    pub(crate) fn upcoming(&self, from: DateTime<Utc>) -> Vec<HistoryRecord> {
        let mut upcoming: Vec<HistoryRecord> = self
            .records
            .values()
            .filter(|r| r.scheduled_at >= from && self.is_live(r))
            .cloned()
            .collect();
        upcoming.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.interviewer_id.cmp(&b.interviewer_id))
        });
        upcoming
    }

    pub(crate) fn count_in_window(
        &self,
        interviewer_id: &InterviewerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u32 {
        let count = self
            .live_bookings(interviewer_id)
            .filter(|r| start <= r.scheduled_at && r.scheduled_at < end)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub(crate) fn count_in_week(&self, interviewer_id: &InterviewerId, week: WeekBucket) -> u32 {
        let count = self
            .live_bookings(interviewer_id)
            .filter(|r| r.week_bucket == week)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn existing_outcome(&self, record: &HistoryRecord) -> Option<AppendOutcome> {
        let existing = self.records.get(&record.key())?;
        if existing.assignment_id() == record.assignment_id() {
            Some(AppendOutcome::AlreadyRecorded)
        } else {
            Some(AppendOutcome::SlotTaken {
                held_by: existing.assignment_id(),
            })
        }
    }

    pub(crate) fn append(&mut self, record: HistoryRecord, tz: Tz) -> LedgerResult<AppendOutcome> {
        record.verify_bucket(tz)?;

        if let Some(outcome) = self.existing_outcome(&record) {
            return Ok(outcome);
        }

        if record.is_tombstone() {
            let booking = RecordKey::booking(record.interviewer_id.clone(), record.scheduled_at);
            if !self.records.contains_key(&booking) {
                return Err(LedgerError::BookingNotFound(booking.to_string()));
            }
        }

        self.records.insert(record.key(), record);
        Ok(AppendOutcome::Appended)
    }

    pub(crate) fn reserve(
        &mut self,
        record: HistoryRecord,
        max_per_week: u32,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> LedgerResult<AppendOutcome> {
        if record.is_tombstone() {
            return Err(EventError::NotABooking(record.key().to_string()).into());
        }
        record.verify_bucket(tz)?;

        if let Some(outcome) = self.existing_outcome(&record) {
            return Ok(outcome);
        }

        let current_week = self.count_in_week(&record.interviewer_id, WeekBucket::of(now, tz));
        if current_week >= max_per_week {
            return Ok(AppendOutcome::OverCapacity {
                current_week,
                max_per_week,
            });
        }

        self.records.insert(record.key(), record);
        Ok(AppendOutcome::Appended)
    }

    pub(crate) fn tombstone_for(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<HistoryRecord> {
        let key = RecordKey::booking(interviewer_id.clone(), scheduled_at);
        let booking = self
            .records
            .get(&key)
            .ok_or_else(|| LedgerError::BookingNotFound(key.to_string()))?;
        Ok(booking.tombstone(reason, now)?)
    }
}
