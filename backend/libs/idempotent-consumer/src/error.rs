//! Error types for idempotent consumer library

use thiserror::Error;

/// Result type for idempotency operations
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Errors that can occur during idempotent event processing
#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// Event ID validation failed (empty, too long)
    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
