//! Error types for change event decoding

use thiserror::Error;

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised when a message value is not a valid envelope
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Message carried no value
    #[error("message has no payload")]
    EmptyPayload,

    /// Value is not JSON or does not match the envelope shape
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Value parsed but violates an envelope invariant
    #[error("invalid envelope: {0}")]
    Invalid(String),
}
