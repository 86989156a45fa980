//! # Change Publisher
//!
//! Producer side of the changefeed: the API write path records one
//! [`EventEnvelope`] per mutating operation and this library ships it to the
//! `database-changes` topic.
//!
//! ## Failure domains
//!
//! The write path and the event path fail independently. A broker outage
//! never fails or rolls back the business transaction that triggered the
//! event:
//!
//! - [`ChangeRecorder::record`] logs the change, hands the publish to a
//!   background task and returns immediately
//! - publish failures are logged and counted, never returned to the caller
//! - if the producer could not connect at boot, changes are still logged
//!   locally and the publish is skipped
//!
//! Delivery is at-least-once; the consumer is responsible for idempotence.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use change_event::Operation;
//! use change_publisher::{ChangeRecorder, KafkaPublisher, PublisherConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PublisherConfig::from_env();
//!
//!     // Startup: one retry after a fixed delay, then run without Kafka
//!     let recorder = match KafkaPublisher::connect_with_retry(&config).await {
//!         Ok(publisher) => ChangeRecorder::new(publisher),
//!         Err(e) => {
//!             tracing::error!(error = %e, "Failed to connect to Kafka");
//!             ChangeRecorder::disabled()
//!         }
//!     };
//!
//!     // Inside a request handler, after the INSERT succeeded
//!     recorder.record(
//!         Operation::Insert,
//!         "todos",
//!         json!({"id": 42, "title": "Buy milk", "user_id": 7}),
//!         Some(7),
//!     );
//! }
//! ```

mod config;
mod error;
mod kafka;
pub mod metrics;
mod recorder;
mod sink;

pub use change_event::{EventEnvelope, Operation, TOPIC};
pub use config::PublisherConfig;
pub use error::{PublishError, PublishResult};
pub use kafka::KafkaPublisher;
pub use recorder::{ChangeRecorder, PublishOutcome, Publisher};
pub use sink::ChangeSink;
