use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use panelist_events::{HistoryRecord, WeekBucket};
use panelist_id::InterviewerId;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{AppendOutcome, HistoryLedger, LedgerResult, LedgerState};

/// Ledger held in process memory.
#[derive(Debug)]
pub struct InMemoryLedger {
    reference_tz: Tz,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(reference_tz: Tz) -> Self {
        Self {
            reference_tz,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Seeds the ledger with existing records, keyed as `append` would.
    pub fn with_records(reference_tz: Tz, records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        Self {
            reference_tz,
            state: RwLock::new(LedgerState::from_records(records)),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryLedger for InMemoryLedger {
    fn reference_tz(&self) -> Tz {
        self.reference_tz
    }

    #[instrument(skip_all, fields(key = %record.key()))]
    async fn append(&self, record: HistoryRecord) -> LedgerResult<AppendOutcome> {
        let outcome = self.state.write().await.append(record, self.reference_tz)?;
        debug!(?outcome, "Ledger append");
        Ok(outcome)
    }

    #[instrument(skip_all, fields(key = %record.key(), max_per_week = max_per_week))]
    async fn reserve(
        &self,
        record: HistoryRecord,
        max_per_week: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        let outcome = self
            .state
            .write()
            .await
            .reserve(record, max_per_week, now, self.reference_tz)?;
        debug!(?outcome, "Ledger reserve");
        Ok(outcome)
    }

    async fn count_in_window(
        &self,
        interviewer_id: &InterviewerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<u32> {
        Ok(self.state.read().await.count_in_window(interviewer_id, start, end))
    }

    async fn count_in_current_week(
        &self,
        interviewer_id: &InterviewerId,
        now: DateTime<Utc>,
    ) -> LedgerResult<u32> {
        let week = WeekBucket::of(now, self.reference_tz);
        Ok(self.state.read().await.count_in_week(interviewer_id, week))
    }

    #[instrument(skip(self, reason, now), fields(interviewer_id = %interviewer_id))]
    async fn cancel(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        let mut state = self.state.write().await;
        let tombstone = state.tombstone_for(interviewer_id, scheduled_at, reason, now)?;
        state.append(tombstone, self.reference_tz)
    }

    async fn records(&self) -> LedgerResult<Vec<HistoryRecord>> {
        Ok(self.state.read().await.records())
    }
}
