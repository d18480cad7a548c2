//! Calendar collaborator.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::hours::Interval;

/// A period during which a calendar owner is not free.
pub type BusyInterval = Interval;

/// Calendar query failures. The resolver turns these into exclusions.
#[derive(Debug, Clone, Error)]
pub enum CalendarError {
    #[error("calendar provider error: {0}")]
    Provider(String),

    #[error("calendar not found: {0}")]
    NotFound(String),

    #[error("calendar query timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of busy intervals.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Busy intervals of `calendar_ref` overlapping `[start, end)`.
    async fn busy_intervals(
        &self,
        calendar_ref: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;
}

/// Calendar answering from an in-memory busy table.
///
/// Unknown calendars are treated as entirely free. Individual calendars can
/// be made to fail or to respond slowly.
#[derive(Debug, Default)]
pub struct StaticCalendar {
    busy: BTreeMap<String, Vec<BusyInterval>>,
    failing: BTreeSet<String>,
    delays: BTreeMap<String, Duration>,
    queries: AtomicUsize,
}

impl StaticCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a `{ "calendar_ref": [{ "start": ..., "end": ... }] }` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calendar file: {}", path.display()))?;
        let busy: BTreeMap<String, Vec<BusyInterval>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse calendar file: {}", path.display()))?;
        Ok(Self {
            busy,
            ..Self::default()
        })
    }

    pub fn with_busy(
        mut self,
        calendar_ref: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        self.busy
            .entry(calendar_ref.into())
            .or_default()
            .push(Interval::new(start, end));
        self
    }

    /// Makes every query for `calendar_ref` fail.
    pub fn failing_for(mut self, calendar_ref: impl Into<String>) -> Self {
        self.failing.insert(calendar_ref.into());
        self
    }

    /// Delays every answer for `calendar_ref`.
    pub fn delayed_for(mut self, calendar_ref: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(calendar_ref.into(), delay);
        self
    }

    /// Number of queries answered or failed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Calendar for StaticCalendar {
    async fn busy_intervals(
        &self,
        calendar_ref: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(calendar_ref) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(calendar_ref) {
            return Err(CalendarError::Provider(format!(
                "calendar {calendar_ref} is unavailable"
            )));
        }

        let range = Interval::new(start, end);
        let busy: Vec<BusyInterval> = self
            .busy
            .get(calendar_ref)
            .map(|intervals| {
                intervals
                    .iter()
                    .filter(|i| i.intersect(&range).is_some())
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        debug!(calendar_ref, busy = busy.len(), "Static calendar query");
        Ok(busy)
    }
}
