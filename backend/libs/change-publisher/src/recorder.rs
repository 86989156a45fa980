use change_event::{EventEnvelope, Operation, RECORD_LOG_TARGET};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::PublishResult;
use crate::metrics::PublisherMetrics;
use crate::sink::ChangeSink;

/// Strict publisher: encodes the envelope and sends it keyed by
/// `"<table>-<OPERATION>"`. Errors are returned to the caller.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn ChangeSink>,
}

impl Publisher {
    pub fn new<S: ChangeSink + 'static>(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub async fn publish(&self, envelope: &EventEnvelope) -> PublishResult<()> {
        let payload = envelope.encode()?;
        self.sink.send(&envelope.partition_key(), &payload).await
    }
}

/// What happened to one best-effort publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Broker error; logged, not propagated
    Failed(String),
    /// No producer session (Kafka was down at boot)
    Skipped,
}

impl PublishOutcome {
    fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Delivered => "delivered",
            PublishOutcome::Failed(_) => "failed",
            PublishOutcome::Skipped => "skipped",
        }
    }
}

/// Collaborator-facing entry point for the API write path.
///
/// Every method is infallible from the caller's point of view: the business
/// transaction has already committed and must not be affected by the event
/// path.
#[derive(Clone)]
pub struct ChangeRecorder {
    publisher: Option<Publisher>,
}

impl ChangeRecorder {
    pub fn new<S: ChangeSink + 'static>(sink: S) -> Self {
        Self {
            publisher: Some(Publisher::new(sink)),
        }
    }

    /// Recorder without a producer session; changes are only logged.
    pub fn disabled() -> Self {
        Self { publisher: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Log the change and publish it in the background.
    ///
    /// Returns the envelope immediately; the caller never waits on the broker.
    pub fn record(
        &self,
        operation: Operation,
        table: &str,
        data: Value,
        user_id: Option<i64>,
    ) -> EventEnvelope {
        let envelope = EventEnvelope::from_value(operation, table, data, user_id);
        log_change(&envelope);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recorder = self.clone();
                let background = envelope.clone();
                handle.spawn(async move {
                    recorder.publish_best_effort(&background).await;
                });
            }
            Err(_) => {
                warn!(
                    table = %envelope.table,
                    operation = %envelope.operation,
                    "No async runtime, change event not published"
                );
                PublisherMetrics::global().record(PublishOutcome::Skipped.label());
            }
        }

        envelope
    }

    /// Log the change and wait for the publish attempt to finish.
    ///
    /// Still never fails; the outcome is reported for callers that care.
    pub async fn record_and_wait(
        &self,
        operation: Operation,
        table: &str,
        data: Value,
        user_id: Option<i64>,
    ) -> PublishOutcome {
        let envelope = EventEnvelope::from_value(operation, table, data, user_id);
        log_change(&envelope);
        self.publish_best_effort(&envelope).await
    }

    /// Publish without propagating errors.
    pub async fn publish_best_effort(&self, envelope: &EventEnvelope) -> PublishOutcome {
        let outcome = match &self.publisher {
            None => {
                debug!(
                    key = %envelope.partition_key(),
                    "Kafka producer not connected, skipping change event"
                );
                PublishOutcome::Skipped
            }
            Some(publisher) => match publisher.publish(envelope).await {
                Ok(()) => PublishOutcome::Delivered,
                Err(e) => {
                    error!(
                        error = %e,
                        key = %envelope.partition_key(),
                        "Failed to send CDC message to Kafka"
                    );
                    PublishOutcome::Failed(e.to_string())
                }
            },
        };

        PublisherMetrics::global().record(outcome.label());
        outcome
    }
}

fn log_change(envelope: &EventEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(json) => info!(
            target: RECORD_LOG_TARGET,
            kind = "DB_CHANGE",
            record = %json,
            "DB_CHANGE: {}",
            json
        ),
        Err(e) => warn!(error = %e, "Failed to serialize change for logging"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ChangeSink for Arc<MemorySink> {
        async fn send(&self, key: &str, payload: &[u8]) -> PublishResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((key.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    struct DownSink;

    #[async_trait]
    impl ChangeSink for DownSink {
        async fn send(&self, _key: &str, _payload: &[u8]) -> PublishResult<()> {
            Err(PublishError::Connection("broker unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_uses_table_operation_key() {
        let sink = Arc::new(MemorySink::default());
        let publisher = Publisher::new(sink.clone());

        let envelope = EventEnvelope::from_value(
            Operation::Update,
            "todos",
            json!({"id": 1, "status": "completed"}),
            Some(3),
        );
        publisher.publish(&envelope).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "todos-UPDATE");
        let decoded = EventEnvelope::decode(&sent[0].1).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn test_strict_publish_propagates_error() {
        let publisher = Publisher::new(DownSink);
        let envelope = EventEnvelope::from_value(Operation::Insert, "todos", json!({"id": 1}), None);
        assert!(matches!(
            publisher.publish(&envelope).await,
            Err(PublishError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let recorder = ChangeRecorder::new(DownSink);
        let outcome = recorder
            .record_and_wait(Operation::Delete, "todos", json!({"id": 9}), Some(1))
            .await;
        assert!(matches!(outcome, PublishOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_disabled_recorder_skips() {
        let recorder = ChangeRecorder::disabled();
        assert!(!recorder.is_enabled());
        let outcome = recorder
            .record_and_wait(Operation::Insert, "users", json!({"id": 2}), None)
            .await;
        assert_eq!(outcome, PublishOutcome::Skipped);
    }

    #[test]
    fn test_record_without_runtime_does_not_panic() {
        let recorder = ChangeRecorder::new(DownSink);
        let envelope = recorder.record(Operation::Insert, "todos", json!({"id": 5}), Some(5));
        assert_eq!(envelope.partition_key(), "todos-INSERT");
    }
}
