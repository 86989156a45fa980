use change_event::{DecodeError, Operation};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Broker unreachable or consumer could not be created
    #[error("Kafka connection error: {0}")]
    Connection(String),

    #[error("Kafka subscription error: {0}")]
    Subscription(String),

    /// Steady-state receive failure; the loop backs off and keeps going
    #[error("Kafka receive error: {0}")]
    Receive(String),

    #[error("Kafka commit error: {0}")]
    Commit(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Startup failed after {attempts} attempts: {last_error}")]
    StartupExhausted {
        attempts: u32,
        #[source]
        last_error: Box<ConsumerError>,
    },

    #[error("Startup interrupted by shutdown signal")]
    Interrupted,
}

/// Failure while handling a well-formed envelope. Logged and dropped.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{table} {operation} change is missing data.{field}")]
    MissingField {
        table: String,
        operation: Operation,
        field: &'static str,
    },

    #[error("Failed to build record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
