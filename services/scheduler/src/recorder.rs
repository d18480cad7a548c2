//! Assignment recording.
//!
//! The ledger write always happens before the invite. An invite failure is
//! recorded on the assignment and never undoes the ledger write: workload
//! fairness counts the booking whether or not the invite went out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use panelist_events::HistoryRecord;
use panelist_id::{AssignmentId, InterviewerId, RunId};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::availability::AvailabilitySlot;
use crate::collaborators::{InviteError, InviteSender};
use crate::ledger::{AppendOutcome, HistoryLedger, LedgerResult};
use crate::pipeline::PipelineTrace;
use crate::registry::{Interviewer, SpecialtyTag};
use crate::request::InterviewRequest;

/// A scheduling decision.
///
/// Durable once the recorder has appended its history record.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub run_id: RunId,
    pub request: InterviewRequest,
    pub interviewer: Interviewer,
    pub slot: AvailabilitySlot,
    pub rank_score: f64,
    pub decided_at: DateTime<Utc>,
    pub reasoning: String,
    pub trace: PipelineTrace,
    pub invite_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_error: Option<String>,
}

impl Assignment {
    /// The booking record this assignment is stored as.
    pub fn history_record(&self, reference_tz: Tz) -> HistoryRecord {
        let specialty = self
            .interviewer
            .matched_specialty(&self.request.required_specialties)
            .cloned()
            .unwrap_or_else(|| SpecialtyTag::new(&self.request.interview_type));

        HistoryRecord::booked(
            self.interviewer.id.clone(),
            self.slot.start,
            reference_tz,
            self.id,
            self.request.duration_minutes,
        )
        .with_specialty(specialty.as_str())
        .recorded_at(self.decided_at)
    }
}

/// What a commit attempt did.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The booking is in the ledger; `invite_failed` reports the invite.
    Recorded(Box<Assignment>),

    /// The interviewer's week filled up since the guard ran.
    OverCapacity { current_week: u32, max_per_week: u32 },

    /// Another assignment holds this interviewer at this instant.
    SlotTaken { held_by: Option<AssignmentId> },
}

/// Writes assignments to the ledger, then issues invites.
pub struct AssignmentRecorder {
    ledger: Arc<dyn HistoryLedger>,
    invites: Arc<dyn InviteSender>,
    invite_timeout: Duration,
}

impl AssignmentRecorder {
    pub fn new(
        ledger: Arc<dyn HistoryLedger>,
        invites: Arc<dyn InviteSender>,
        invite_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            invites,
            invite_timeout,
        }
    }

    /// Reserves the ledger entry, then sends the invite.
    #[instrument(
        skip_all,
        fields(assignment_id = %assignment.id, interviewer_id = %assignment.interviewer.id)
    )]
    pub async fn commit(
        &self,
        mut assignment: Assignment,
        now: DateTime<Utc>,
    ) -> LedgerResult<CommitOutcome> {
        let record = assignment.history_record(self.ledger.reference_tz());
        let max_per_week = assignment.interviewer.max_per_week;

        match self.ledger.reserve(record, max_per_week, now).await? {
            AppendOutcome::Appended | AppendOutcome::AlreadyRecorded => {}
            AppendOutcome::OverCapacity {
                current_week,
                max_per_week,
            } => {
                warn!(current_week, max_per_week, "Interviewer filled up before commit");
                return Ok(CommitOutcome::OverCapacity {
                    current_week,
                    max_per_week,
                });
            }
            AppendOutcome::SlotTaken { held_by } => {
                warn!(held_by = ?held_by, "Slot taken before commit");
                return Ok(CommitOutcome::SlotTaken { held_by });
            }
        }

        info!(start = %assignment.slot.start, "Assignment recorded");
        self.deliver(&mut assignment).await;
        Ok(CommitOutcome::Recorded(Box::new(assignment)))
    }

    /// Sends the invite again for an assignment whose invite failed.
    ///
    /// Returns true when the invite went out.
    #[instrument(skip_all, fields(assignment_id = %assignment.id))]
    pub async fn retry_invite(&self, assignment: &mut Assignment) -> bool {
        self.deliver(assignment).await
    }

    /// Cancels a booking by appending a tombstone.
    #[instrument(skip(self, reason, now), fields(interviewer_id = %interviewer_id))]
    pub async fn cancel(
        &self,
        interviewer_id: &InterviewerId,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<AppendOutcome> {
        let outcome = self
            .ledger
            .cancel(interviewer_id, scheduled_at, reason, now)
            .await?;
        info!(?outcome, "Booking cancelled");
        Ok(outcome)
    }

    async fn deliver(&self, assignment: &mut Assignment) -> bool {
        let sent = tokio::time::timeout(self.invite_timeout, self.invites.send_invite(assignment))
            .await
            .unwrap_or(Err(InviteError::Timeout));

        match sent {
            Ok(()) => {
                assignment.invite_failed = false;
                assignment.invite_error = None;
                true
            }
            Err(e) => {
                warn!(
                    assignment_id = %assignment.id,
                    error = %e,
                    "Invite delivery failed; booking stands"
                );
                assignment.invite_failed = true;
                assignment.invite_error = Some(e.to_string());
                false
            }
        }
    }
}
