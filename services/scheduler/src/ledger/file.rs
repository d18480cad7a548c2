//! Ledger persisted to a JSON state file.
//!
//! The whole record set is rewritten after every successful append using the
//! write-to-temp + rename pattern, so a crash leaves either the previous or
//! the new file on disk, never a partial one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use panelist_events::{HistoryRecord, RecordKey, WeekBucket};
use panelist_id::InterviewerId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{AppendOutcome, HistoryLedger, LedgerError, LedgerResult, LedgerState};

/// Ledger file format version.
const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLedger {
    version: u32,
    reference_tz: Tz,
    records: Vec<HistoryRecord>,
}

/// Ledger backed by a JSON file.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    reference_tz: Tz,
    state: RwLock<LedgerState>,
}

impl FileLedger {
    /// Opens the ledger at `path`.
    ///
    /// A missing file starts an empty ledger. A file that does not parse, has
    /// another format version, or was written for a different reference
    /// timezone is an error and is left untouched.
    pub fn open(path: impl Into<PathBuf>, reference_tz: Tz) -> LedgerResult<Self> {
        let path = path.into();
        let state = Self::load(&path, reference_tz)?;
        Ok(Self {
            path,
            reference_tz,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path, reference_tz: Tz) -> LedgerResult<LedgerState> {
        if !path.exists() {
            debug!(path = %path.display(), "No ledger file, starting fresh");
            return Ok(LedgerState::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;

        let persisted: PersistedLedger = serde_json::from_str(&content).map_err(|e| {
            LedgerError::Storage(format!("failed to parse {}: {e}", path.display()))
        })?;

        if persisted.version != LEDGER_VERSION {
            return Err(LedgerError::Storage(format!(
                "{} has ledger format version {}, expected {}",
                path.display(),
                persisted.version,
                LEDGER_VERSION
            )));
        }

        if persisted.reference_tz != reference_tz {
            return Err(LedgerError::Storage(format!(
                "{} was written for reference timezone {}, not {}",
                path.display(),
                persisted.reference_tz,
                reference_tz
            )));
        }

        for record in &persisted.records {
            record.verify_bucket(reference_tz)?;
        }

        info!(
            path = %path.display(),
            record_count = persisted.records.len(),
            "Loaded ledger from disk"
        );

        Ok(LedgerState::from_records(persisted.records))
    }

    async fn save(&self, state: &LedgerState) -> LedgerResult<()> {
        let storage = |what: &str, path: &Path, e: std::io::Error| {
            LedgerError::Storage(format!("failed to {what} {}: {e}", path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage("create directory", parent, e))?;
        }

        let persisted = PersistedLedger {
            version: LEDGER_VERSION,
            reference_tz: self.reference_tz,
            records: state.records(),
        };
        let content = serde_json::to_string_pretty(&persisted)
            .map_err(|e| LedgerError::Storage(format!("failed to serialize ledger: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| storage("write", &tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| storage("rename into", &self.path, e))?;

        debug!(
            path = %self.path.display(),
            record_count = persisted.records.len(),
            "Saved ledger to disk"
        );
        Ok(())
    }

    /// Persists a freshly appended record, or removes it again if the save fails.
    async fn persist(
        &self,
        state: &mut LedgerState,
        key: RecordKey,
        outcome: AppendOutcome,
    ) -> LedgerResult<AppendOutcome> {
        if outcome == AppendOutcome::Appended {
            if let Err(e) = self.save(state).await {
                warn!(key = %key, error = %e, "Ledger save failed, rolling back append");
                state.remove(&key);
                return Err(e);
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl HistoryLedger for FileLedger {
    fn reference_tz(&self) -> Tz {
        self.reference_tz
    }

    #[instrument(skip_all, fields(key = %record.key()))]
    async fn append(&self, record: HistoryRecord) -> LedgerResult<AppendOutcome> {
        let key = record.key();
        let mut state = self.state.write().await;
        let outcome = state.append(record, self.reference_tz)?;
        self.persist(&mut state, key, outcome).await
    }

    #[instrument(skip_all, fields(key = %record.key(), max_per_week = max_per_week))]
    async fn reserve(
        &self,
        record: HistoryRecord,
        max_per_week: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        let key = record.key();
        let mut state = self.state.write().await;
        let outcome = state.reserve(record, max_per_week, now, self.reference_tz)?;
        self.persist(&mut state, key, outcome).await
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
        let key = tombstone.key();
        let outcome = state.append(tombstone, self.reference_tz)?;
        self.persist(&mut state, key, outcome).await
    }

    async fn records(&self) -> LedgerResult<Vec<HistoryRecord>> {
        Ok(self.state.read().await.records())
    }
}
