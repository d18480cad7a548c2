//! Fairness ranking.
//!
//! Candidates are scored by how far their interviewer's booking count sits
//! from the team's fair share, minus bonuses for specialty match and
//! timezone overlap. Lower scores rank first.
//!
//! ```text
//! fair_share = total rolling bookings of active interviewers / active count
//! deviation  = rolling_count - fair_share
//! score      = deviation - specialty_bonus - timezone_bonus * overlap_ratio
//! ```
//!
//! Ties break on fewer current-week bookings, then interviewer id, then slot
//! start, so the order is total and reproducible.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use panelist_id::InterviewerId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::availability::{AvailabilitySlot, CandidateKey};
use crate::collaborators::{AssistContext, RankingAssist};
use crate::hours::WorkingHours;
use crate::ledger::{HistoryLedger, LedgerResult};
use crate::registry::{Interviewer, InterviewerRegistry};
use crate::request::InterviewRequest;

const EPSILON: f64 = 1e-9;

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    /// Subtracted from the score when specialties match.
    pub specialty_bonus: f64,

    /// Subtracted from the score, scaled by working-hours overlap.
    pub timezone_bonus: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            specialty_bonus: 1.5,
            timezone_bonus: 1.0,
        }
    }
}

/// The span of bookings fairness is computed over, relative to now.
///
/// The window reaches into the future so that bookings already made for the
/// coming weeks count against their interviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairnessWindow {
    pub lookback: TimeDelta,
    pub lookahead: TimeDelta,
}

impl Default for FairnessWindow {
    fn default() -> Self {
        Self {
            lookback: TimeDelta::days(21),
            lookahead: TimeDelta::days(28),
        }
    }
}

impl FairnessWindow {
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.lookback, now + self.lookahead)
    }
}

// =============================================================================
// Fairness Snapshot
// =============================================================================

/// Rolling booking counts for the active pool at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FairnessSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub rolling_counts: BTreeMap<InterviewerId, u32>,
    pub total: u32,
    pub active: usize,
    pub fair_share: f64,
}

impl FairnessSnapshot {
    /// Reads one rolling count per active interviewer.
    pub async fn capture(
        ledger: &dyn HistoryLedger,
        registry: &InterviewerRegistry,
        now: DateTime<Utc>,
        window: FairnessWindow,
    ) -> LedgerResult<Self> {
        let (window_start, window_end) = window.bounds(now);

        let mut counts = BTreeMap::new();
        for interviewer in registry.active_interviewers() {
            let count = ledger
                .count_in_window(&interviewer.id, window_start, window_end)
                .await?;
            counts.insert(interviewer.id.clone(), count);
        }

        Ok(Self::from_counts(counts, window_start, window_end))
    }

    pub fn from_counts(
        rolling_counts: BTreeMap<InterviewerId, u32>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        let total: u32 = rolling_counts.values().sum();
        let active = rolling_counts.len();
        let fair_share = if active == 0 {
            0.0
        } else {
            f64::from(total) / active as f64
        };

        Self {
            window_start,
            window_end,
            rolling_counts,
            total,
            active,
            fair_share,
        }
    }

    pub fn rolling_count(&self, id: &InterviewerId) -> u32 {
        self.rolling_counts.get(id).copied().unwrap_or(0)
    }

    pub fn deviation(&self, id: &InterviewerId) -> f64 {
        f64::from(self.rolling_count(id)) - self.fair_share
    }
}

// =============================================================================
// Ranked Candidates
// =============================================================================

/// A scored (interviewer, slot) candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub slot: AvailabilitySlot,
    pub interviewer_name: String,
    pub score: f64,
    pub deviation: f64,
    pub rolling_count: u32,
    pub week_count: u32,
    pub specialty_match: bool,
    pub specialty_bonus: f64,
    pub overlap_ratio: f64,
    pub timezone_bonus: f64,
    pub reasoning: String,
}

impl RankedCandidate {
    pub fn key(&self) -> CandidateKey {
        self.slot.key()
    }

    pub fn interviewer_id(&self) -> &InterviewerId {
        &self.slot.interviewer_id
    }
}

/// The total order candidates are ranked by.
pub fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.week_count.cmp(&b.week_count))
        .then_with(|| a.slot.interviewer_id.cmp(&b.slot.interviewer_id))
        .then(a.slot.start.cmp(&b.slot.start))
}

/// Everything a ranking pass reads.
#[derive(Debug, Clone, Copy)]
pub struct RankingInput<'a> {
    pub slots: &'a [AvailabilitySlot],
    pub registry: &'a InterviewerRegistry,
    pub request: &'a InterviewRequest,
    pub fairness: &'a FairnessSnapshot,
    pub week_counts: &'a BTreeMap<InterviewerId, u32>,
}

// =============================================================================
// Rule-Based Ranker
// =============================================================================

#[derive(Debug, Clone)]
pub struct RuleBasedRanker {
    weights: RankingWeights,
    working_hours: WorkingHours,
}

impl RuleBasedRanker {
    pub fn new(weights: RankingWeights, working_hours: WorkingHours) -> Self {
        Self {
            weights,
            working_hours,
        }
    }

    pub fn weights(&self) -> RankingWeights {
        self.weights
    }

    /// Scores and sorts every slot. Pure: equal inputs give equal output.
    pub fn rank(&self, input: &RankingInput<'_>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = input
            .slots
            .iter()
            .filter_map(|slot| {
                let interviewer = input.registry.get(&slot.interviewer_id)?;
                Some(self.score(slot, interviewer, input))
            })
            .collect();
        ranked.sort_by(compare);
        ranked
    }

    fn score(
        &self,
        slot: &AvailabilitySlot,
        interviewer: &Interviewer,
        input: &RankingInput<'_>,
    ) -> RankedCandidate {
        let request = input.request;
        let rolling_count = input.fairness.rolling_count(&interviewer.id);
        let deviation = input.fairness.deviation(&interviewer.id);

        let specialty_match = interviewer.matches_any(&request.required_specialties);
        let specialty_bonus = if specialty_match {
            self.weights.specialty_bonus
        } else {
            0.0
        };

        let overlap_ratio = self.working_hours.overlap_ratio(
            interviewer.timezone,
            request.candidate_timezone,
            slot.start,
        );
        let timezone_bonus = self.weights.timezone_bonus * overlap_ratio;

        // Adding 0.0 turns -0.0 into 0.0 so total_cmp treats them alike.
        let score = deviation - specialty_bonus - timezone_bonus + 0.0;

        RankedCandidate {
            slot: slot.clone(),
            interviewer_name: interviewer.name.clone(),
            score,
            deviation,
            rolling_count,
            week_count: input.week_counts.get(&interviewer.id).copied().unwrap_or(0),
            specialty_match,
            specialty_bonus,
            overlap_ratio,
            timezone_bonus,
            reasoning: reasoning(
                interviewer,
                rolling_count,
                deviation,
                input.fairness.fair_share,
                specialty_match,
                slot,
                request,
            ),
        }
    }
}

fn reasoning(
    interviewer: &Interviewer,
    rolling_count: u32,
    deviation: f64,
    fair_share: f64,
    specialty_match: bool,
    slot: &AvailabilitySlot,
    request: &InterviewRequest,
) -> String {
    let name = &interviewer.name;
    let mut reasons = Vec::with_capacity(3);

    if deviation < -EPSILON {
        reasons.push(format!(
            "{name} has {rolling_count} interviews in the fairness window, {:.1} below the team average of {fair_share:.1}",
            deviation.abs()
        ));
    } else if deviation.abs() <= EPSILON {
        reasons.push(format!(
            "{name} is exactly at the team average of {fair_share:.1} interviews"
        ));
    } else {
        reasons.push(format!(
            "{name} is {deviation:.1} above the team average of {fair_share:.1}"
        ));
    }

    if specialty_match {
        reasons.push(format!(
            "their specialty matches the {} interview",
            request.interview_type
        ));
    }

    reasons.push(format!(
        "available {} (candidate local {})",
        slot.local_start(interviewer.timezone).format("%a %b %-d %H:%M %Z"),
        slot.local_start(request.candidate_timezone).format("%H:%M %Z"),
    ));

    reasons.join("; ")
}

// =============================================================================
// Ranker
// =============================================================================

/// Result of a ranking pass.
#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub candidates: Vec<RankedCandidate>,

    /// True when the assist's order replaced the rule-based top-K.
    pub assist_applied: bool,

    /// Why the assist's order was not used, when it was consulted.
    pub assist_fallback: Option<String>,
}

/// Ranking policy.
#[derive(Clone)]
pub enum Ranker {
    RuleBased(RuleBasedRanker),

    /// Rule-based ranking whose top `top_k` an assist may reorder.
    AssistAugmented {
        rules: RuleBasedRanker,
        assist: Arc<dyn RankingAssist>,
        top_k: usize,
        timeout: Duration,
    },
}

impl std::fmt::Debug for Ranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ranker::RuleBased(rules) => f.debug_tuple("RuleBased").field(rules).finish(),
            Ranker::AssistAugmented {
                rules,
                top_k,
                timeout,
                ..
            } => f
                .debug_struct("AssistAugmented")
                .field("rules", rules)
                .field("top_k", top_k)
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

impl Ranker {
    pub fn rules(&self) -> &RuleBasedRanker {
        match self {
            Ranker::RuleBased(rules) => rules,
            Ranker::AssistAugmented { rules, .. } => rules,
        }
    }

    #[instrument(skip_all, fields(slots = input.slots.len()))]
    pub async fn rank(&self, input: RankingInput<'_>) -> RankingOutcome {
        let ranked = self.rules().rank(&input);

        let Ranker::AssistAugmented {
            assist,
            top_k,
            timeout,
            ..
        } = self
        else {
            return RankingOutcome {
                candidates: ranked,
                assist_applied: false,
                assist_fallback: None,
            };
        };

        let k = (*top_k).min(ranked.len());
        if k < 2 {
            return RankingOutcome {
                candidates: ranked,
                assist_applied: false,
                assist_fallback: None,
            };
        }

        let context = AssistContext::from(input.request);
        let fallback = match tokio::time::timeout(*timeout, assist.reorder(&ranked[..k], &context))
            .await
        {
            Ok(Ok(order)) => match reorder_top_k(&ranked, &order, k) {
                Some(reordered) => {
                    debug!(top_k = k, "Applied ranking assist order");
                    return RankingOutcome {
                        candidates: reordered,
                        assist_applied: true,
                        assist_fallback: None,
                    };
                }
                None => "assist order was not a permutation of the top candidates".to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("assist timed out after {timeout:?}"),
        };

        debug!(reason = %fallback, "Ranking assist unavailable, keeping rule-based order");
        RankingOutcome {
            candidates: ranked,
            assist_applied: false,
            assist_fallback: Some(fallback),
        }
    }
}

/// Applies `order` to the first `k` candidates.
///
/// Returns `None` unless `order` names each of those `k` candidates exactly
/// once. Candidates past `k` keep their place.
pub fn reorder_top_k(
    ranked: &[RankedCandidate],
    order: &[CandidateKey],
    k: usize,
) -> Option<Vec<RankedCandidate>> {
    if k > ranked.len() || order.len() != k {
        return None;
    }

    let mut positions: HashMap<CandidateKey, usize> = ranked[..k]
        .iter()
        .enumerate()
        .map(|(i, c)| (c.key(), i))
        .collect();

    let mut reordered = Vec::with_capacity(ranked.len());
    for key in order {
        let i = positions.remove(key)?;
        reordered.push(ranked[i].clone());
    }
    reordered.extend_from_slice(&ranked[k..]);
    Some(reordered)
}
