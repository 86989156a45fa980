//! Database change consumer.
//!
//! Subscribes to the `database-changes` topic as a member of a fixed consumer
//! group, routes every envelope to its entity handler and writes the derived
//! records to the log stream. Delivery is at-least-once; handlers are
//! idempotent in effect.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod router;
pub mod subscriber;

pub use config::Config;
pub use error::{ConsumerError, HandlerError, Result};
pub use lifecycle::{ConsumerService, ConsumerStatus, StatusTracker};
pub use pipeline::{MessageProcessor, ProcessingOutcome};
pub use records::{DerivedRecord, RecordEmitter, RecordKind, TracingEmitter};
pub use router::Router;
pub use subscriber::{KafkaSubscriber, MessageSource, RawMessage};
