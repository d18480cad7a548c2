//! Decision pipeline.
//!
//! A run moves through a fixed sequence of stages and ends in exactly one
//! terminal outcome:
//!
//! ```text
//! Resolving -> Guarding -> Ranking -> Committing -> Committed
//!     |           |           |            |
//!     +-----------+-----------+--> NoAvailability
//!     +-----------+-----------+------------+--> Aborted(reason)
//! ```
//!
//! Cancellation is honoured up to the start of `Committing`. From then on
//! the commit runs to completion so the ledger and the invite never disagree
//! about a half-finished decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use panelist_events::HistoryRecord;
use panelist_id::{AssignmentId, InterviewerId, RunId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::availability::{AvailabilityResolver, Exclusion, ResolverSettings};
use crate::capacity::{CapacityDrop, CapacityGuard};
use crate::collaborators::{Calendar, Clock, InviteSender, RankingAssist};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::ledger::{AppendOutcome, HistoryLedger, LedgerResult};
use crate::ranking::{
    FairnessSnapshot, FairnessWindow, RankedCandidate, Ranker, RankingInput, RankingOutcome,
    RuleBasedRanker,
};
use crate::recorder::{Assignment, AssignmentRecorder, CommitOutcome};
use crate::registry::InterviewerRegistry;
use crate::request::InterviewRequest;
use crate::workload::{self, WorkloadStats};

// =============================================================================
// Stages and Trace
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Guarding,
    Ranking,
    Committing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Guarding => "guarding",
            Stage::Ranking => "ranking",
            Stage::Committing => "committing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub stage: Stage,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Ordered log of what a run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipelineTrace(Vec<TraceEntry>);

impl PipelineTrace {
    pub fn push(&mut self, stage: Stage, at: DateTime<Utc>, message: impl Into<String>) {
        self.0.push(TraceEntry {
            stage,
            at,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.0
    }

    /// Stages in the order they were first entered.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        for entry in &self.0 {
            if !stages.contains(&entry.stage) {
                stages.push(entry.stage);
            }
        }
        stages
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why a run stopped without a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("capacity race exhausted after {attempts} commit attempts")]
    CapacityRaceExhausted { attempts: usize },

    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("{stage} failed: {cause}")]
    Fault { stage: Stage, cause: String },
}

impl AbortReason {
    pub fn stage(&self) -> Stage {
        match self {
            AbortReason::InvalidRequest { .. } => Stage::Resolving,
            AbortReason::CapacityRaceExhausted { .. } => Stage::Committing,
            AbortReason::Cancelled { stage } | AbortReason::Fault { stage, .. } => *stage,
        }
    }
}

/// What was left out when a run found nothing to book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoAvailabilityReport {
    /// Stage that ran out of candidates.
    pub stage: Stage,
    pub queried: usize,
    pub excluded: Vec<Exclusion>,
    pub capacity_dropped: Vec<CapacityDrop>,
}

/// Terminal outcome of a scheduling run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Committed(Box<Assignment>),
    NoAvailability {
        run_id: RunId,
        report: NoAvailabilityReport,
        trace: PipelineTrace,
    },
    Aborted {
        run_id: RunId,
        reason: AbortReason,
        trace: PipelineTrace,
    },
}

impl RunOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            RunOutcome::Committed(assignment) => Some(assignment),
            _ => None,
        }
    }

    pub fn trace(&self) -> &PipelineTrace {
        match self {
            RunOutcome::Committed(assignment) => &assignment.trace,
            RunOutcome::NoAvailability { trace, .. } | RunOutcome::Aborted { trace, .. } => trace,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, RunOutcome::Committed(_))
    }
}

/// Ranked candidates from a run that stops before committing.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub run_id: RunId,

    /// The best candidates, best first.
    pub candidates: Vec<RankedCandidate>,

    /// Candidates that survived the guard, before truncation.
    pub total_candidates: usize,

    pub excluded: Vec<Exclusion>,
    pub capacity_dropped: Vec<CapacityDrop>,
    pub fairness: FairnessSnapshot,
    pub assist_applied: bool,
    pub trace: PipelineTrace,
}

/// Terminal outcome of a preview run.
#[derive(Debug, Clone)]
pub enum PreviewOutcome {
    Ready(Box<Preview>),
    NoAvailability {
        run_id: RunId,
        report: NoAvailabilityReport,
        trace: PipelineTrace,
    },
    Aborted {
        run_id: RunId,
        reason: AbortReason,
        trace: PipelineTrace,
    },
}

// =============================================================================
// Cancellation
// =============================================================================

/// Receiving side of a run cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self(None)
    }

    /// A connected handle and signal.
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), CancelSignal(Some(rx)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Pending forever otherwise,
    /// including after the handle is dropped.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.0.as_mut() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Sending side of a run cancellation.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// External collaborators a pipeline is wired to.
pub struct Collaborators {
    pub calendar: Arc<dyn Calendar>,
    pub invites: Arc<dyn InviteSender>,
    pub clock: Arc<dyn Clock>,
    pub assist: Option<Arc<dyn RankingAssist>>,
}

/// Internal early exit of the pre-commit stages.
enum Halt {
    NoAvailability(NoAvailabilityReport),
    Aborted(AbortReason),
}

struct Evaluation {
    excluded: Vec<Exclusion>,
    capacity_dropped: Vec<CapacityDrop>,
    fairness: FairnessSnapshot,
    ranking: RankingOutcome,
}

/// Turns interview requests into committed assignments.
pub struct DecisionPipeline {
    registry: Arc<InterviewerRegistry>,
    ledger: Arc<dyn HistoryLedger>,
    resolver: AvailabilityResolver,
    guard: CapacityGuard,
    ranker: Ranker,
    recorder: AssignmentRecorder,
    clock: Arc<dyn Clock>,
    fairness_window: FairnessWindow,
    commit_retry_bound: usize,
    preview_top_k: usize,
}

impl DecisionPipeline {
    /// Wires a pipeline. Fails on invalid configuration or when the ledger
    /// buckets weeks in a different timezone than the configuration.
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<InterviewerRegistry>,
        ledger: Arc<dyn HistoryLedger>,
        collaborators: Collaborators,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        if ledger.reference_tz() != config.reference_tz {
            return Err(SchedulerError::Configuration(format!(
                "ledger reference timezone {} does not match configured {}",
                ledger.reference_tz(),
                config.reference_tz
            )));
        }

        let rules = RuleBasedRanker::new(config.weights, config.working_hours);
        let ranker = match collaborators.assist {
            Some(assist) => Ranker::AssistAugmented {
                rules,
                assist,
                top_k: config.assist_top_k,
                timeout: config.assist_timeout,
            },
            None => Ranker::RuleBased(rules),
        };

        Ok(Self {
            resolver: AvailabilityResolver::new(
                collaborators.calendar,
                ResolverSettings::from(config),
            ),
            guard: CapacityGuard::new(Arc::clone(&ledger)),
            recorder: AssignmentRecorder::new(
                Arc::clone(&ledger),
                collaborators.invites,
                config.invite_timeout,
            ),
            ranker,
            registry,
            ledger,
            clock: collaborators.clock,
            fairness_window: config.fairness_window,
            commit_retry_bound: config.commit_retry_bound,
            preview_top_k: config.preview_top_k,
        })
    }

    pub fn registry(&self) -> &InterviewerRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<dyn HistoryLedger> {
        &self.ledger
    }

    pub fn recorder(&self) -> &AssignmentRecorder {
        &self.recorder
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// Runs all stages and commits the best candidate.
    pub async fn schedule(&self, request: InterviewRequest, cancel: CancelSignal) -> RunOutcome {
        self.run(RunId::new(), request, cancel).await
    }

    #[instrument(skip_all, fields(run_id = %run_id, candidate = %request.candidate_email))]
    async fn run(
        &self,
        run_id: RunId,
        request: InterviewRequest,
        mut cancel: CancelSignal,
    ) -> RunOutcome {
        let now = self.clock.now();
        let mut trace = PipelineTrace::default();

        let evaluation = match self.evaluate(&request, &mut cancel, now, &mut trace).await {
            Ok(evaluation) => evaluation,
            Err(halt) => {
                self.record_halt(&halt, &mut trace);
                return match halt {
                    Halt::NoAvailability(report) => RunOutcome::NoAvailability {
                        run_id,
                        report,
                        trace,
                    },
                    Halt::Aborted(reason) => RunOutcome::Aborted {
                        run_id,
                        reason,
                        trace,
                    },
                };
            }
        };

        // Last point at which a cancellation is honoured.
        if let Err(reason) = self.enter(Stage::Committing, &cancel, &mut trace) {
            self.record_halt(&Halt::Aborted(reason.clone()), &mut trace);
            return RunOutcome::Aborted {
                run_id,
                reason,
                trace,
            };
        }

        self.commit(run_id, &request, evaluation.ranking.candidates, now, trace)
            .await
    }

    async fn commit(
        &self,
        run_id: RunId,
        request: &InterviewRequest,
        ranked: Vec<RankedCandidate>,
        now: DateTime<Utc>,
        mut trace: PipelineTrace,
    ) -> RunOutcome {
        let mut attempts = 0;
        let mut full: BTreeSet<InterviewerId> = BTreeSet::new();

        for candidate in &ranked {
            if attempts >= self.commit_retry_bound {
                break;
            }
            if full.contains(candidate.interviewer_id()) {
                continue;
            }
            let Some(interviewer) = self.registry.get(candidate.interviewer_id()) else {
                continue;
            };
            attempts += 1;

            let assignment = Assignment {
                id: AssignmentId::new(),
                run_id,
                request: request.clone(),
                interviewer: interviewer.clone(),
                slot: candidate.slot.clone(),
                rank_score: candidate.score,
                decided_at: self.clock.now(),
                reasoning: candidate.reasoning.clone(),
                trace: PipelineTrace::default(),
                invite_failed: false,
                invite_error: None,
            };

            match self.recorder.commit(assignment, now).await {
                Ok(CommitOutcome::Recorded(mut assignment)) => {
                    trace.push(
                        Stage::Committing,
                        self.clock.now(),
                        format!(
                            "committed {} at {} (attempt {attempts})",
                            interviewer.id,
                            assignment.slot.start.to_rfc3339()
                        ),
                    );
                    match &assignment.invite_error {
                        Some(error) => trace.push(
                            Stage::Committing,
                            self.clock.now(),
                            format!("invite failed: {error}"),
                        ),
                        None => trace.push(Stage::Committing, self.clock.now(), "invite sent"),
                    }
                    assignment.trace = trace;

                    info!(
                        assignment_id = %assignment.id,
                        interviewer_id = %assignment.interviewer.id,
                        start = %assignment.slot.start,
                        score = assignment.rank_score,
                        invite_failed = assignment.invite_failed,
                        "Run committed"
                    );
                    return RunOutcome::Committed(assignment);
                }
                Ok(CommitOutcome::OverCapacity {
                    current_week,
                    max_per_week,
                }) => {
                    full.insert(interviewer.id.clone());
                    trace.push(
                        Stage::Committing,
                        self.clock.now(),
                        format!(
                            "{} reached capacity ({current_week}/{max_per_week}) before commit",
                            interviewer.id
                        ),
                    );
                }
                Ok(CommitOutcome::SlotTaken { .. }) => {
                    trace.push(
                        Stage::Committing,
                        self.clock.now(),
                        format!(
                            "{} at {} already booked",
                            interviewer.id,
                            candidate.slot.start.to_rfc3339()
                        ),
                    );
                }
                Err(e) => {
                    let reason = AbortReason::Fault {
                        stage: Stage::Committing,
                        cause: e.to_string(),
                    };
                    trace.push(Stage::Committing, self.clock.now(), format!("aborted: {reason}"));
                    warn!(error = %e, "Commit failed");
                    return RunOutcome::Aborted {
                        run_id,
                        reason,
                        trace,
                    };
                }
            }
        }

        let reason = AbortReason::CapacityRaceExhausted { attempts };
        trace.push(Stage::Committing, self.clock.now(), format!("aborted: {reason}"));
        warn!(attempts, "Commit attempts exhausted");
        RunOutcome::Aborted {
            run_id,
            reason,
            trace,
        }
    }

    /// Runs resolving, guarding and ranking, and returns the top candidates.
    #[instrument(skip_all, fields(candidate = %request.candidate_email))]
    pub async fn preview(
        &self,
        request: InterviewRequest,
        mut cancel: CancelSignal,
    ) -> PreviewOutcome {
        let run_id = RunId::new();
        let now = self.clock.now();
        let mut trace = PipelineTrace::default();

        let evaluation = match self.evaluate(&request, &mut cancel, now, &mut trace).await {
            Ok(evaluation) => evaluation,
            Err(halt) => {
                self.record_halt(&halt, &mut trace);
                return match halt {
                    Halt::NoAvailability(report) => PreviewOutcome::NoAvailability {
                        run_id,
                        report,
                        trace,
                    },
                    Halt::Aborted(reason) => PreviewOutcome::Aborted {
                        run_id,
                        reason,
                        trace,
                    },
                };
            }
        };

        let total_candidates = evaluation.ranking.candidates.len();
        let candidates: Vec<RankedCandidate> = evaluation
            .ranking
            .candidates
            .into_iter()
            .take(self.preview_top_k)
            .collect();
        trace.push(
            Stage::Ranking,
            self.clock.now(),
            format!("preview of top {} of {total_candidates}", candidates.len()),
        );

        PreviewOutcome::Ready(Box::new(Preview {
            run_id,
            candidates,
            total_candidates,
            excluded: evaluation.excluded,
            capacity_dropped: evaluation.capacity_dropped,
            fairness: evaluation.fairness,
            assist_applied: evaluation.ranking.assist_applied,
            trace,
        }))
    }

    /// Resolving, guarding and ranking, shared by runs and previews.
    async fn evaluate(
        &self,
        request: &InterviewRequest,
        cancel: &mut CancelSignal,
        now: DateTime<Utc>,
        trace: &mut PipelineTrace,
    ) -> Result<Evaluation, Halt> {
        if let Err(e) = request.validate() {
            return Err(Halt::Aborted(AbortReason::InvalidRequest {
                message: e.to_string(),
            }));
        }

        // Resolving
        self.enter(Stage::Resolving, cancel, trace)
            .map_err(Halt::Aborted)?;
        let interviewers = self.registry.active_interviewers();
        let resolution = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Halt::Aborted(AbortReason::Cancelled { stage: Stage::Resolving }));
            }
            resolution = self.resolver.resolve(request, &interviewers, now) => resolution,
        };
        trace.push(
            Stage::Resolving,
            self.clock.now(),
            format!(
                "{} slots from {} interviewers, {} excluded",
                resolution.slots.len(),
                resolution.queried,
                resolution.excluded.len()
            ),
        );
        for exclusion in &resolution.excluded {
            trace.push(
                Stage::Resolving,
                self.clock.now(),
                format!("excluded {}: {}", exclusion.interviewer_id, exclusion.reason),
            );
        }
        if resolution.is_empty() {
            return Err(Halt::NoAvailability(NoAvailabilityReport {
                stage: Stage::Resolving,
                queried: resolution.queried,
                excluded: resolution.excluded,
                capacity_dropped: Vec::new(),
            }));
        }

        // Guarding
        self.enter(Stage::Guarding, cancel, trace)
            .map_err(Halt::Aborted)?;
        let guarded = self
            .guard
            .filter(resolution.slots, &self.registry, now)
            .await
            .map_err(|e| fault(Stage::Guarding, e))?;
        for full in &guarded.dropped {
            trace.push(
                Stage::Guarding,
                self.clock.now(),
                format!(
                    "dropped {} at capacity ({}/{})",
                    full.interviewer_id, full.current_week, full.max_per_week
                ),
            );
        }
        if guarded.slots.is_empty() {
            return Err(Halt::NoAvailability(NoAvailabilityReport {
                stage: Stage::Guarding,
                queried: resolution.queried,
                excluded: resolution.excluded,
                capacity_dropped: guarded.dropped,
            }));
        }

        // Ranking
        self.enter(Stage::Ranking, cancel, trace)
            .map_err(Halt::Aborted)?;
        let fairness = FairnessSnapshot::capture(
            self.ledger.as_ref(),
            &self.registry,
            now,
            self.fairness_window,
        )
        .await
        .map_err(|e| fault(Stage::Ranking, e))?;

        let ranking = self
            .ranker
            .rank(RankingInput {
                slots: &guarded.slots,
                registry: &self.registry,
                request,
                fairness: &fairness,
                week_counts: &guarded.week_counts,
            })
            .await;

        trace.push(
            Stage::Ranking,
            self.clock.now(),
            format!(
                "ranked {} candidates, fair share {:.2} over {} active",
                ranking.candidates.len(),
                fairness.fair_share,
                fairness.active
            ),
        );
        if ranking.assist_applied {
            trace.push(Stage::Ranking, self.clock.now(), "assist order applied");
        } else if let Some(reason) = &ranking.assist_fallback {
            trace.push(
                Stage::Ranking,
                self.clock.now(),
                format!("assist ignored, rule-based order kept: {reason}"),
            );
        }
        if ranking.candidates.is_empty() {
            return Err(Halt::NoAvailability(NoAvailabilityReport {
                stage: Stage::Ranking,
                queried: resolution.queried,
                excluded: resolution.excluded,
                capacity_dropped: guarded.dropped,
            }));
        }

        Ok(Evaluation {
            excluded: resolution.excluded,
            capacity_dropped: guarded.dropped,
            fairness,
            ranking,
        })
    }

    /// Records entry into `stage`, unless the run was cancelled.
    fn enter(
        &self,
        stage: Stage,
        cancel: &CancelSignal,
        trace: &mut PipelineTrace,
    ) -> Result<(), AbortReason> {
        if cancel.is_cancelled() {
            return Err(AbortReason::Cancelled { stage });
        }
        debug!(%stage, "Entering stage");
        trace.push(stage, self.clock.now(), format!("entered {stage}"));
        Ok(())
    }

    /// Records and logs a halt.
    fn record_halt(&self, halt: &Halt, trace: &mut PipelineTrace) {
        match halt {
            Halt::NoAvailability(report) => {
                trace.push(report.stage, self.clock.now(), "no availability");
                info!(
                    stage = %report.stage,
                    excluded = report.excluded.len(),
                    capacity_dropped = report.capacity_dropped.len(),
                    "No availability"
                );
            }
            Halt::Aborted(reason) => {
                trace.push(reason.stage(), self.clock.now(), format!("aborted: {reason}"));
                warn!(reason = %reason, "Run aborted");
            }
        }
    }

    /// Cancels a committed booking.
    pub async fn cancel_booking(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
    ) -> LedgerResult<AppendOutcome> {
        self.recorder
            .cancel(interviewer_id, scheduled_at, reason, self.clock.now())
            .await
    }

    /// Per-interviewer workload as of now.
    pub async fn workload(&self) -> LedgerResult<Vec<WorkloadStats>> {
        workload::workload_report(
            &self.registry,
            self.ledger.as_ref(),
            self.clock.now(),
            self.fairness_window,
        )
        .await
    }

    /// Live bookings from now on, earliest first.
    pub async fn upcoming(&self) -> LedgerResult<Vec<HistoryRecord>> {
        workload::upcoming(self.ledger.as_ref(), self.clock.now()).await
    }
}

fn fault(stage: Stage, e: impl std::fmt::Display) -> Halt {
    Halt::Aborted(AbortReason::Fault {
        stage,
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_stages_in_entry_order() {
        let mut trace = PipelineTrace::default();
        let at = Utc::now();
        trace.push(Stage::Resolving, at, "entered resolving");
        trace.push(Stage::Resolving, at, "3 slots");
        trace.push(Stage::Guarding, at, "entered guarding");
        trace.push(Stage::Ranking, at, "entered ranking");

        assert_eq!(
            trace.stages(),
            vec![Stage::Resolving, Stage::Guarding, Stage::Ranking]
        );
        assert_eq!(trace.len(), 4);
    }

    #[test]
    fn test_abort_reason_serialization() {
        let reason = AbortReason::Cancelled {
            stage: Stage::Guarding,
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["stage"], "guarding");
        assert_eq!(reason.to_string(), "cancelled during guarding");
        assert_eq!(
            AbortReason::CapacityRaceExhausted { attempts: 3 }.stage(),
            Stage::Committing
        );
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let never = CancelSignal::never();
        assert!(!never.is_cancelled());

        let (handle, mut signal) = CancelSignal::channel();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());

        tokio::time::timeout(std::time::Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, mut signal) = CancelSignal::channel();
        drop(handle);

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
