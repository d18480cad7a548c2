//! Weekly capacity guard.
//!
//! Runs before ranking. The guard reads one current-week count per
//! interviewer and then filters without further ledger access; the commit
//! stage re-checks capacity atomically through `HistoryLedger::reserve`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use panelist_id::InterviewerId;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::availability::AvailabilitySlot;
use crate::ledger::{HistoryLedger, LedgerResult};
use crate::registry::InterviewerRegistry;

/// An interviewer removed because their week is full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityDrop {
    pub interviewer_id: InterviewerId,
    pub current_week: u32,
    pub max_per_week: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GuardOutcome {
    /// Slots whose interviewer still has room this week, order preserved.
    pub slots: Vec<AvailabilitySlot>,

    /// Interviewers dropped, sorted by id.
    pub dropped: Vec<CapacityDrop>,

    /// Current-week count for every interviewer that had slots.
    pub week_counts: BTreeMap<InterviewerId, u32>,
}

pub struct CapacityGuard {
    ledger: Arc<dyn HistoryLedger>,
}

impl CapacityGuard {
    pub fn new(ledger: Arc<dyn HistoryLedger>) -> Self {
        Self { ledger }
    }

    /// Reads current-week counts for the interviewers in `slots` and filters.
    #[instrument(skip_all, fields(slots = slots.len()))]
    pub async fn filter(
        &self,
        slots: Vec<AvailabilitySlot>,
        registry: &InterviewerRegistry,
        now: DateTime<Utc>,
    ) -> LedgerResult<GuardOutcome> {
        let ids: BTreeSet<&InterviewerId> = slots.iter().map(|s| &s.interviewer_id).collect();

        let mut week_counts = BTreeMap::new();
        for id in ids {
            let count = self.ledger.count_in_current_week(id, now).await?;
            week_counts.insert(id.clone(), count);
        }

        Ok(apply(slots, week_counts, registry))
    }

    /// True when the interviewer can take another booking this week.
    pub async fn has_capacity(
        &self,
        interviewer_id: &InterviewerId,
        max_per_week: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let count = self.ledger.count_in_current_week(interviewer_id, now).await?;
        Ok(count < max_per_week)
    }
}

/// Drops every slot whose interviewer has `week_count >= max_per_week`.
///
/// Slots for interviewers missing from the registry are dropped as well.
pub fn apply(
    slots: Vec<AvailabilitySlot>,
    week_counts: BTreeMap<InterviewerId, u32>,
    registry: &InterviewerRegistry,
) -> GuardOutcome {
    let mut dropped: BTreeMap<InterviewerId, CapacityDrop> = BTreeMap::new();

    let slots = slots
        .into_iter()
        .filter(|slot| {
            let Some(interviewer) = registry.get(&slot.interviewer_id) else {
                return false;
            };
            let current_week = week_counts.get(&slot.interviewer_id).copied().unwrap_or(0);
            if current_week >= interviewer.max_per_week {
                dropped
                    .entry(slot.interviewer_id.clone())
                    .or_insert_with(|| CapacityDrop {
                        interviewer_id: slot.interviewer_id.clone(),
                        current_week,
                        max_per_week: interviewer.max_per_week,
                    });
                return false;
            }
            true
        })
        .collect();

    for full in dropped.values() {
        debug!(
            interviewer_id = %full.interviewer_id,
            current_week = full.current_week,
            max_per_week = full.max_per_week,
            "Interviewer at weekly capacity"
        );
    }

    GuardOutcome {
        slots,
        dropped: dropped.into_values().collect(),
        week_counts,
    }
}
