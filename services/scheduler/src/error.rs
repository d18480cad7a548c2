//! Top-level scheduler errors.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::registry::RegistryError;
use crate::request::RequestError;

/// Errors surfaced by the scheduler outside of a run's structured outcome.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration rejected before any run started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Interviewer registry failed to load or validate.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Ledger read or write failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

impl SchedulerError {
    /// Returns true for errors that must stop the process before scheduling.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Registry(_))
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
