//! Workload reporting.

use chrono::{DateTime, Utc};
use panelist_events::HistoryRecord;
use panelist_id::InterviewerId;
use serde::Serialize;
use tracing::instrument;

use crate::ledger::{HistoryLedger, LedgerResult, LedgerState};
use crate::ranking::{FairnessSnapshot, FairnessWindow};
use crate::registry::{InterviewerRegistry, SpecialtyTag};

/// Load carried by one active interviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadStats {
    pub interviewer_id: InterviewerId,
    pub name: String,
    pub specialties: Vec<SpecialtyTag>,

    /// Live bookings inside the fairness window.
    pub rolling_count: u32,

    /// Live bookings in the current reference week.
    pub week_count: u32,

    pub max_per_week: u32,
    pub fair_share: f64,
    pub deviation: f64,
    pub capacity_used_pct: f64,
    pub at_capacity: bool,
}

/// Per-interviewer workload for every active interviewer, sorted by id.
#[instrument(skip_all)]
pub async fn workload_report(
    registry: &InterviewerRegistry,
    ledger: &dyn HistoryLedger,
    now: DateTime<Utc>,
    window: FairnessWindow,
) -> LedgerResult<Vec<WorkloadStats>> {
    let fairness = FairnessSnapshot::capture(ledger, registry, now, window).await?;

    let mut report = Vec::with_capacity(fairness.active);
    for interviewer in registry.active_interviewers() {
        let week_count = ledger.count_in_current_week(&interviewer.id, now).await?;
        let capacity_used_pct = if interviewer.max_per_week == 0 {
            100.0
        } else {
            f64::from(week_count) / f64::from(interviewer.max_per_week) * 100.0
        };

        report.push(WorkloadStats {
            interviewer_id: interviewer.id.clone(),
            name: interviewer.name.clone(),
            specialties: interviewer.specialties.iter().cloned().collect(),
            rolling_count: fairness.rolling_count(&interviewer.id),
            week_count,
            max_per_week: interviewer.max_per_week,
            fair_share: fairness.fair_share,
            deviation: fairness.deviation(&interviewer.id),
            capacity_used_pct,
            at_capacity: week_count >= interviewer.max_per_week,
        });
    }

    Ok(report)
}

/// Live bookings scheduled at or after `now`, earliest first.
pub async fn upcoming(
    ledger: &dyn HistoryLedger,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<HistoryRecord>> {
    let records = ledger.records().await?;
    Ok(LedgerState::from_records(records).upcoming(now))
}
