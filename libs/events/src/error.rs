//! Error types for history records.

use thiserror::Error;

/// Errors that can occur when building or decoding history records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A week bucket string could not be parsed.
    #[error("invalid week bucket: {0}")]
    InvalidWeekBucket(String),

    /// The stored week bucket disagrees with the one derived from the instant.
    #[error("week bucket mismatch: record has {actual}, expected {expected}")]
    BucketMismatch { expected: String, actual: String },

    /// A tombstone was requested for a record that is not a booking.
    #[error("record for {0} is not a booking")]
    NotABooking(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
