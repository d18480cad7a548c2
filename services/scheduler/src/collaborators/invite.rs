//! Invite collaborator.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use panelist_id::AssignmentId;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::recorder::Assignment;

#[derive(Debug, Clone, Error)]
pub enum InviteError {
    #[error("invite delivery failed: {0}")]
    Delivery(String),

    #[error("invite delivery timed out")]
    Timeout,
}

/// Issues calendar invites for committed assignments.
///
/// Implementations must be idempotent per assignment id: the recorder may
/// send the same assignment again when an operator retries.
#[async_trait]
pub trait InviteSender: Send + Sync {
    async fn send_invite(&self, assignment: &Assignment) -> Result<(), InviteError>;
}

/// Invite sender that only logs the invite it would send.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInviteSender;

#[async_trait]
impl InviteSender for LoggingInviteSender {
    async fn send_invite(&self, assignment: &Assignment) -> Result<(), InviteError> {
        info!(
            assignment_id = %assignment.id,
            interviewer_id = %assignment.interviewer.id,
            interviewer_email = %assignment.interviewer.email,
            candidate_email = %assignment.request.candidate_email,
            start = %assignment.slot.start,
            end = %assignment.slot.end,
            "Interview invite issued"
        );
        Ok(())
    }
}

/// Invite sender for tests.
#[derive(Debug, Default)]
pub struct MockInviteSender {
    fail: bool,
    attempts: AtomicUsize,
    sent: Mutex<BTreeSet<AssignmentId>>,
}

impl MockInviteSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Deliveries attempted, including failed and repeated ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Distinct assignments delivered.
    pub async fn sent(&self) -> Vec<AssignmentId> {
        self.sent.lock().await.iter().copied().collect()
    }
}

#[async_trait]
impl InviteSender for MockInviteSender {
    async fn send_invite(&self, assignment: &Assignment) -> Result<(), InviteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InviteError::Delivery(
                "mock invite sender configured to fail".to_string(),
            ));
        }
        self.sent.lock().await.insert(assignment.id);
        Ok(())
    }
}
