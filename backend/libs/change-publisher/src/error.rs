//! Error types for the change publisher.

use thiserror::Error;

/// Result type alias for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur on the producer side.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Broker unreachable or producer could not be created
    #[error("Connection error: {0}")]
    Connection(String),

    /// Broker rejected or failed to acknowledge the message
    #[error("Publish failed: {0}")]
    SendFailed(String),

    /// Send did not complete within the configured timeout
    #[error("Publish timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
