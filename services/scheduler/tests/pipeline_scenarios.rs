//! End-to-end runs of the decision pipeline against in-memory collaborators.


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Europe::London;
use chrono_tz::Tz;
use panelist_events::HistoryRecord;
use panelist_id::InterviewerId;
use panelist_scheduler::ledger::LedgerResult;
use panelist_scheduler::{
    AbortReason, AppendOutcome, Assignment, AssistContext, AssistError, CancelSignal,
    CandidateKey, Collaborators, CommitOutcome, DecisionPipeline, FixedClock, HistoryLedger,
    InMemoryLedger, InterviewRequest, LedgerError, MockInviteSender, PreviewOutcome,
    RankedCandidate, RankingAssist, RunOutcome, SchedulerConfig, Stage, StaticCalendar,
};

use harness::{
    calendar, id, interviewer, now, past_booking, request, this_week_booking, utc, PipelineBuilder,
};

fn ledger(records: impl IntoIterator<Item = HistoryRecord>) -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::with_records(
        SchedulerConfig::default().reference_tz,
        records,
    ))
}

fn committed(outcome: RunOutcome) -> Box<Assignment> {
    match outcome {
        RunOutcome::Committed(assignment) => assignment,
        other => panic!("expected a committed run, got {other:?}"),
    }
}

fn preview_candidates(outcome: PreviewOutcome) -> Vec<RankedCandidate> {
    match outcome {
        PreviewOutcome::Ready(preview) => preview.candidates,
        other => panic!("expected a preview, got {other:?}"),
    }
}

fn keys(candidates: &[RankedCandidate]) -> Vec<CandidateKey> {
    candidates.iter().map(RankedCandidate::key).collect()
}

// =============================================================================
// Worked scenarios
// =============================================================================

#[tokio::test]
async fn test_underloaded_specialist_wins() {
    let registry = harness::registry([
        interviewer("a", London)
            .with_specialty("ML")
            .with_max_per_week(2),
        interviewer("b", London)
            .with_specialty("Data Engineering")
            .with_max_per_week(2),
    ]);
    let ledger = ledger([past_booking("a", 7)]);
    let pipeline = PipelineBuilder::new(registry, ledger.clone()).build();

    let req = request(London, "data", utc(20, 10, 0), utc(20, 11, 0))
        .with_required_specialty("Data Engineering");

    let ranked = preview_candidates(pipeline.preview(req.clone(), CancelSignal::never()).await);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].interviewer_id(), &id("b"));
    assert!(ranked[0].specialty_match);
    assert_eq!(ranked[1].interviewer_id(), &id("a"));

    let assignment = committed(pipeline.schedule(req, CancelSignal::never()).await);
    assert_eq!(assignment.interviewer.id, id("b"));
    assert_eq!(assignment.slot.start, utc(20, 10, 0));
    assert!(assignment.reasoning.contains("below the team average"));
    assert_eq!(
        ledger
            .count_in_current_week(&id("b"), now())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_full_interviewer_never_ranked() {
    let registry = harness::registry([
        interviewer("x", London).with_max_per_week(1),
        interviewer("y", London).with_max_per_week(5),
    ]);
    // x has the better rolling count but no room this week.
    let ledger = ledger([
        this_week_booking("x", utc(19, 20, 0)),
        past_booking("y", 5),
        past_booking("y", 6),
        past_booking("y", 7),
    ]);
    let pipeline = PipelineBuilder::new(registry, ledger).build();

    let req = request(London, "tech_screen", utc(20, 8, 0), utc(20, 17, 0));
    let outcome = pipeline.preview(req.clone(), CancelSignal::never()).await;
    let PreviewOutcome::Ready(preview) = outcome else {
        panic!("expected a preview");
    };

    assert!(preview
        .candidates
        .iter()
        .all(|c| c.interviewer_id() == &id("y")));
    assert_eq!(preview.capacity_dropped.len(), 1);
    assert_eq!(preview.capacity_dropped[0].interviewer_id, id("x"));
    assert!(preview.fairness.deviation(&id("x")) < preview.fairness.deviation(&id("y")));

    let assignment = committed(pipeline.schedule(req, CancelSignal::never()).await);
    assert_eq!(assignment.interviewer.id, id("y"));
}

#[tokio::test]
async fn test_calendar_failure_excludes_only_that_interviewer() {
    let registry = harness::registry([interviewer("y", London), interviewer("z", London)]);
    let pipeline = PipelineBuilder::new(registry, ledger([]))
        .calendar(StaticCalendar::new().failing_for(calendar("y")))
        .build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    let trace_mentions_y = outcome
        .trace()
        .entries()
        .iter()
        .any(|e| e.stage == Stage::Resolving && e.message.starts_with("excluded y"));
    assert!(trace_mentions_y);

    let assignment = committed(outcome);
    assert_eq!(assignment.interviewer.id, id("z"));
    assert_eq!(
        assignment.trace.stages(),
        vec![
            Stage::Resolving,
            Stage::Guarding,
            Stage::Ranking,
            Stage::Committing
        ]
    );
}

// =============================================================================
// Properties of whole runs
// =============================================================================

#[tokio::test]
async fn test_identical_inputs_give_identical_decisions() {
    let build = || {
        let registry = harness::registry([
            interviewer("a", London).with_specialty("Platform"),
            interviewer("b", New_York),
            interviewer("c", London),
        ]);
        PipelineBuilder::new(registry, ledger([past_booking("a", 3), past_booking("c", 10)]))
            .calendar(StaticCalendar::new().with_busy(
                calendar("b"),
                utc(20, 13, 0),
                utc(20, 15, 0),
            ))
            .build()
    };
    let req = request(London, "system_design", utc(20, 8, 0), utc(20, 17, 0))
        .with_required_specialty("platform");

    let first = preview_candidates(build().preview(req.clone(), CancelSignal::never()).await);
    let second = preview_candidates(build().preview(req.clone(), CancelSignal::never()).await);
    assert_eq!(first, second);

    let one = committed(build().schedule(req.clone(), CancelSignal::never()).await);
    let two = committed(build().schedule(req, CancelSignal::never()).await);
    assert_eq!(one.interviewer.id, two.interviewer.id);
    assert_eq!(one.slot, two.slot);
    assert_eq!(one.rank_score, two.rank_score);
}

#[tokio::test]
async fn test_repeated_runs_spread_load() {
    let registry = harness::registry([
        interviewer("a", London),
        interviewer("b", London),
        interviewer("c", London),
    ]);
    let pipeline = PipelineBuilder::new(registry, ledger([])).build();
    let req = request(London, "tech_screen", utc(20, 9, 0), utc(20, 12, 0));

    let mut chosen = Vec::new();
    for _ in 0..3 {
        let assignment = committed(pipeline.schedule(req.clone(), CancelSignal::never()).await);
        chosen.push(assignment.interviewer.id.clone());
    }

    assert_eq!(chosen, vec![id("a"), id("b"), id("c")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_respect_weekly_cap() {
    let registry = harness::registry([interviewer("solo", London).with_max_per_week(2)]);
    let ledger = ledger([]);
    let pipeline = Arc::new(PipelineBuilder::new(registry, ledger.clone()).build());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            pipeline
                .schedule(
                    request(London, "coding", utc(20, 7, 0), utc(20, 17, 0)),
                    CancelSignal::never(),
                )
                .await
        });
    }

    let mut starts: Vec<DateTime<Utc>> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            RunOutcome::Committed(assignment) => starts.push(assignment.slot.start),
            RunOutcome::NoAvailability { report, .. } => assert_eq!(report.stage, Stage::Guarding),
            RunOutcome::Aborted { reason, .. } => assert!(matches!(
                reason,
                AbortReason::CapacityRaceExhausted { .. }
            )),
        }
    }

    starts.sort();
    starts.dedup();
    assert_eq!(starts.len(), 2);
    assert_eq!(
        ledger
            .count_in_current_week(&id("solo"), now())
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_recommitting_an_assignment_is_a_no_op() {
    let registry = harness::registry([interviewer("a", London)]);
    let ledger = ledger([]);
    let pipeline = PipelineBuilder::new(registry, ledger.clone()).build();

    let assignment = committed(
        pipeline
            .schedule(
                request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
                CancelSignal::never(),
            )
            .await,
    );

    let again = pipeline
        .recorder()
        .commit((*assignment).clone(), now())
        .await
        .unwrap();
    assert!(matches!(again, CommitOutcome::Recorded(_)));
    assert_eq!(ledger.len().await, 1);
    assert_eq!(
        ledger.append(assignment.history_record(ledger.reference_tz())).await.unwrap(),
        AppendOutcome::AlreadyRecorded
    );
}

#[tokio::test]
async fn test_invite_failure_keeps_the_booking() {
    let registry = harness::registry([interviewer("a", London)]);
    let ledger = ledger([]);
    let invites = Arc::new(MockInviteSender::failing());
    let pipeline = PipelineBuilder::new(registry, ledger.clone())
        .invites(invites.clone())
        .build();

    let assignment = committed(
        pipeline
            .schedule(
                request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
                CancelSignal::never(),
            )
            .await,
    );

    assert!(assignment.invite_failed);
    assert!(assignment
        .trace
        .entries()
        .iter()
        .any(|e| e.message.starts_with("invite failed")));
    assert_eq!(invites.attempts(), 1);
    assert_eq!(ledger.count_in_current_week(&id("a"), now()).await.unwrap(), 1);
}

// =============================================================================
// Terminal outcomes other than a commit
// =============================================================================

#[tokio::test]
async fn test_cancel_before_start_aborts_without_writes() {
    let registry = harness::registry([interviewer("a", London)]);
    let ledger = ledger([]);
    let pipeline = PipelineBuilder::new(registry, ledger.clone()).build();

    let (handle, signal) = CancelSignal::channel();
    handle.cancel();
    let outcome = pipeline
        .schedule(request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)), signal)
        .await;

    let RunOutcome::Aborted { reason, trace, .. } = outcome else {
        panic!("expected an aborted run");
    };
    assert_eq!(
        reason,
        AbortReason::Cancelled {
            stage: Stage::Resolving
        }
    );
    assert!(trace.entries().last().unwrap().message.starts_with("aborted"));
    assert_eq!(ledger.len().await, 0);
}

#[tokio::test]
async fn test_cancel_during_calendar_queries() {
    let registry = harness::registry([interviewer("slow", London)]);
    let ledger = ledger([]);
    let calendar = StaticCalendar::new().delayed_for(calendar("slow"), Duration::from_secs(5));
    let pipeline = Arc::new(PipelineBuilder::new(registry, ledger.clone()).calendar(calendar).build());

    let (handle, signal) = CancelSignal::channel();
    let run = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .schedule(request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)), signal)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("cancelled run should finish promptly")
        .unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Aborted {
            reason: AbortReason::Cancelled {
                stage: Stage::Resolving
            },
            ..
        }
    ));
    assert_eq!(ledger.len().await, 0);
}

#[tokio::test]
async fn test_invalid_request_aborts() {
    let registry = harness::registry([interviewer("a", London)]);
    let pipeline = PipelineBuilder::new(registry, ledger([])).build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 12, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::Aborted {
            reason: AbortReason::InvalidRequest { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_slots_before_now_are_never_booked() {
    let registry = harness::registry([interviewer("a", London)]);
    let pipeline = PipelineBuilder::new(registry, ledger([])).build();

    // The whole of Monday in UTC; London working hours began at 07:00 UTC.
    let assignment = committed(
        pipeline
            .schedule(
                request(London, "coding", utc(19, 0, 0), utc(20, 0, 0)),
                CancelSignal::never(),
            )
            .await,
    );

    assert_eq!(assignment.slot.start, now());
}

#[tokio::test]
async fn test_weekend_only_range_has_no_availability() {
    let registry = harness::registry([interviewer("a", London)]);
    let pipeline = PipelineBuilder::new(registry, ledger([])).build();
    let saturday = request(London, "coding", utc(24, 0, 0), utc(25, 0, 0));

    let outcome = pipeline.schedule(saturday.clone(), CancelSignal::never()).await;
    assert!(matches!(
        outcome,
        RunOutcome::NoAvailability { ref report, .. } if report.stage == Stage::Resolving
    ));

    let registry = harness::registry([interviewer("a", London)]);
    let weekends_allowed = PipelineBuilder::new(registry, ledger([]))
        .configure(|config| config.working_hours.skip_weekends = false)
        .build();
    let assignment = committed(weekends_allowed.schedule(saturday, CancelSignal::never()).await);
    assert_eq!(assignment.slot.start, utc(24, 7, 0));
}

#[tokio::test]
async fn test_no_availability_when_every_calendar_fails() {
    let registry = harness::registry([interviewer("a", London), interviewer("b", London)]);
    let pipeline = PipelineBuilder::new(registry, ledger([]))
        .calendar(
            StaticCalendar::new()
                .failing_for(calendar("a"))
                .failing_for(calendar("b")),
        )
        .build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    let RunOutcome::NoAvailability { report, .. } = outcome else {
        panic!("expected no availability");
    };
    assert_eq!(report.stage, Stage::Resolving);
    assert_eq!(report.queried, 2);
    assert_eq!(report.excluded.len(), 2);
}

#[tokio::test]
async fn test_no_availability_when_everyone_is_full() {
    let registry = harness::registry([interviewer("a", London).with_max_per_week(1)]);
    let pipeline =
        PipelineBuilder::new(registry, ledger([this_week_booking("a", utc(21, 9, 0))])).build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    let RunOutcome::NoAvailability { report, .. } = outcome else {
        panic!("expected no availability");
    };
    assert_eq!(report.stage, Stage::Guarding);
    assert_eq!(report.capacity_dropped[0].current_week, 1);
}

/// Ledger whose reservations always lose a race, or always fail.
struct ContendedLedger {
    inner: InMemoryLedger,
    broken: bool,
}

#[async_trait]
impl HistoryLedger for ContendedLedger {
    fn reference_tz(&self) -> Tz {
        self.inner.reference_tz()
    }

    async fn append(&self, record: HistoryRecord) -> LedgerResult<AppendOutcome> {
        self.inner.append(record).await
    }

    async fn reserve(
        &self,
        _record: HistoryRecord,
        max_per_week: u32,
        _now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        if self.broken {
            return Err(LedgerError::Storage("disk full".to_string()));
        }
        Ok(AppendOutcome::OverCapacity {
            current_week: max_per_week,
            max_per_week,
        })
    }

    async fn count_in_window(
        &self,
        interviewer_id: &InterviewerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<u32> {
        self.inner.count_in_window(interviewer_id, start, end).await
    }

    async fn count_in_current_week(
        &self,
        interviewer_id: &InterviewerId,
        now: DateTime<Utc>,
    ) -> LedgerResult<u32> {
        self.inner.count_in_current_week(interviewer_id, now).await
    }

    async fn cancel(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        self.inner.cancel(interviewer_id, scheduled_at, reason, now).await
    }

    async fn records(&self) -> LedgerResult<Vec<HistoryRecord>> {
        self.inner.records().await
    }
}

#[tokio::test]
async fn test_capacity_race_exhausts_retry_bound() {
    let registry = harness::registry([
        interviewer("a", London),
        interviewer("b", London),
        interviewer("c", London),
        interviewer("d", London),
    ]);
    let contended = Arc::new(ContendedLedger {
        inner: InMemoryLedger::new(SchedulerConfig::default().reference_tz),
        broken: false,
    });
    let pipeline = PipelineBuilder::new(registry, contended.clone()).build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    let RunOutcome::Aborted { reason, trace, .. } = outcome else {
        panic!("expected an aborted run");
    };
    assert_eq!(reason, AbortReason::CapacityRaceExhausted { attempts: 3 });
    let capacity_misses = trace
        .entries()
        .iter()
        .filter(|e| e.message.contains("reached capacity"))
        .count();
    assert_eq!(capacity_misses, 3);
    assert!(contended.inner.is_empty().await);
}

#[tokio::test]
async fn test_ledger_failure_aborts_commit() {
    let registry = harness::registry([interviewer("a", London)]);
    let broken = Arc::new(ContendedLedger {
        inner: InMemoryLedger::new(SchedulerConfig::default().reference_tz),
        broken: true,
    });
    let invites = Arc::new(MockInviteSender::new());
    let pipeline = PipelineBuilder::new(registry, broken)
        .invites(invites.clone())
        .build();

    let outcome = pipeline
        .schedule(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::Aborted {
            reason: AbortReason::Fault {
                stage: Stage::Committing,
                ..
            },
            ..
        }
    ));
    assert_eq!(invites.attempts(), 0);
}

// =============================================================================
// Preview, cancellation and reporting
// =============================================================================

#[tokio::test]
async fn test_preview_is_read_only_and_truncated() {
    let registry = harness::registry([interviewer("a", London), interviewer("b", London)]);
    let ledger = ledger([]);
    let invites = Arc::new(MockInviteSender::new());
    let pipeline = PipelineBuilder::new(registry, ledger.clone())
        .invites(invites.clone())
        .configure(|config| config.preview_top_k = 3)
        .build();

    let outcome = pipeline
        .preview(
            request(London, "coding", utc(20, 9, 0), utc(20, 12, 0)),
            CancelSignal::never(),
        )
        .await;
    let PreviewOutcome::Ready(preview) = outcome else {
        panic!("expected a preview");
    };

    assert_eq!(preview.candidates.len(), 3);
    assert_eq!(preview.total_candidates, 10);
    assert!(!preview.assist_applied);
    assert_eq!(ledger.len().await, 0);
    assert_eq!(invites.attempts(), 0);
}

#[tokio::test]
async fn test_cancelled_booking_frees_capacity() {
    let registry = harness::registry([interviewer("a", London).with_max_per_week(1)]);
    let ledger = ledger([]);
    let pipeline = PipelineBuilder::new(registry, ledger.clone()).build();
    let req = request(London, "coding", utc(20, 9, 0), utc(20, 12, 0));

    let first = committed(pipeline.schedule(req.clone(), CancelSignal::never()).await);
    assert_eq!(pipeline.upcoming().await.unwrap().len(), 1);
    assert!(matches!(
        pipeline.schedule(req.clone(), CancelSignal::never()).await,
        RunOutcome::NoAvailability { .. }
    ));

    let outcome = pipeline
        .cancel_booking(&id("a"), first.slot.start, "candidate withdrew")
        .await
        .unwrap();
    assert_eq!(outcome, AppendOutcome::Appended);
    assert!(pipeline.upcoming().await.unwrap().is_empty());

    let workload = pipeline.workload().await.unwrap();
    assert_eq!(workload[0].week_count, 0);
    assert!(!workload[0].at_capacity);

    // The cancelled instant stays taken; the next slot is booked instead.
    let second = committed(pipeline.schedule(req, CancelSignal::never()).await);
    assert_ne!(second.slot.start, first.slot.start);
}

#[test]
fn test_ledger_timezone_must_match_config() {
    let registry = harness::registry([interviewer("a", London)]);
    let result = DecisionPipeline::new(
        &SchedulerConfig::default(),
        registry,
        Arc::new(InMemoryLedger::new(New_York)),
        Collaborators {
            calendar: Arc::new(StaticCalendar::new()),
            invites: Arc::new(MockInviteSender::new()),
            clock: Arc::new(FixedClock(now())),
            assist: None,
        },
    );

    let Err(e) = result else {
        panic!("expected a configuration error");
    };
    assert!(e.is_configuration());
}

// =============================================================================
// Ranking assist fallbacks
// =============================================================================

enum AssistBehaviour {
    Reverse,
    Fail,
    DropOne,
    Stall,
}

struct ScriptedAssist(AssistBehaviour);

#[async_trait]
impl RankingAssist for ScriptedAssist {
    async fn reorder(
        &self,
        top_k: &[RankedCandidate],
        _context: &AssistContext,
    ) -> Result<Vec<CandidateKey>, AssistError> {
        let mut order: Vec<CandidateKey> = top_k.iter().map(RankedCandidate::key).collect();
        match self.0 {
            AssistBehaviour::Reverse => {
                order.reverse();
                Ok(order)
            }
            AssistBehaviour::Fail => Err(AssistError::Unavailable("connection refused".into())),
            AssistBehaviour::DropOne => {
                order.pop();
                Ok(order)
            }
            AssistBehaviour::Stall => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(order)
            }
        }
    }
}

fn assisted_preview_setup() -> (PipelineBuilder, InterviewRequest) {
    let registry = harness::registry([
        interviewer("a", London),
        interviewer("b", London),
        interviewer("c", London),
    ]);
    let builder = PipelineBuilder::new(
        registry,
        ledger([past_booking("a", 2), past_booking("b", 4), past_booking("b", 9)]),
    )
    .configure(|config| {
        config.preview_top_k = 10;
        config.assist_timeout = Duration::from_millis(50);
    });
    (
        builder,
        request(London, "coding", utc(20, 10, 0), utc(20, 12, 0)),
    )
}

#[tokio::test]
async fn test_assist_reorders_top_candidates() {
    let (builder, req) = assisted_preview_setup();
    let rules = preview_candidates(builder.build().preview(req.clone(), CancelSignal::never()).await);

    let (builder, _) = assisted_preview_setup();
    let outcome = builder
        .assist(Arc::new(ScriptedAssist(AssistBehaviour::Reverse)))
        .build()
        .preview(req, CancelSignal::never())
        .await;
    let PreviewOutcome::Ready(preview) = outcome else {
        panic!("expected a preview");
    };

    assert!(preview.assist_applied);
    let mut expected = keys(&rules[..5]);
    expected.reverse();
    expected.extend(keys(&rules[5..]));
    assert_eq!(keys(&preview.candidates), expected);
}

#[tokio::test]
async fn test_assist_failures_keep_rule_order() {
    for behaviour in [
        AssistBehaviour::Fail,
        AssistBehaviour::DropOne,
        AssistBehaviour::Stall,
    ] {
        let (builder, req) = assisted_preview_setup();
        let rules =
            preview_candidates(builder.build().preview(req.clone(), CancelSignal::never()).await);

        let (builder, _) = assisted_preview_setup();
        let outcome = builder
            .assist(Arc::new(ScriptedAssist(behaviour)))
            .build()
            .preview(req, CancelSignal::never())
            .await;
        let PreviewOutcome::Ready(preview) = outcome else {
            panic!("expected a preview");
        };

        assert!(!preview.assist_applied);
        assert!(preview
            .trace
            .entries()
            .iter()
            .any(|e| e.message.starts_with("assist ignored")));
        assert_eq!(keys(&preview.candidates), keys(&rules));
    }
}
