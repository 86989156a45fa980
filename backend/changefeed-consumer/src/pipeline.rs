use change_event::EventEnvelope;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ConsumerError;
use crate::metrics::ConsumerMetrics;
use crate::records::{ProcessedRecord, RecordEmitter};
use crate::router::Router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Decode,
    Handler,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Decode => "decode",
            DropReason::Handler => "handler",
        }
    }
}

/// Terminal state of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Records emitted, including `PROCESSED_DB_CHANGE`
    Processed { records: usize },
    LoggedAndDropped(DropReason),
}

/// Decode, route and emit, one message at a time.
///
/// Nothing fails past this boundary: decode and handler errors are logged
/// and the message is considered handled.
pub struct MessageProcessor {
    router: Router,
    emitter: Arc<dyn RecordEmitter>,
    processor_id: String,
    sequence: AtomicU64,
    metrics: ConsumerMetrics,
}

impl MessageProcessor {
    pub fn new(
        router: Router,
        emitter: Arc<dyn RecordEmitter>,
        processor_id: impl Into<String>,
        metrics: ConsumerMetrics,
    ) -> Self {
        Self {
            router,
            emitter,
            processor_id: processor_id.into(),
            sequence: AtomicU64::new(0),
            metrics,
        }
    }

    /// Messages seen so far, including dropped ones
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub async fn process(&self, payload: Option<&[u8]>) -> ProcessingOutcome {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let envelope = match EventEnvelope::decode(payload.unwrap_or_default()) {
            Ok(envelope) => envelope,
            Err(e) => {
                let raw = payload
                    .map(|p| String::from_utf8_lossy(p).into_owned())
                    .unwrap_or_else(|| "No message value".to_string());
                error!(
                    message_sequence = sequence,
                    error = %ConsumerError::from(e),
                    raw_message = %raw,
                    "Error processing message"
                );
                return self.dropped(DropReason::Decode);
            }
        };

        info!(
            message_sequence = sequence,
            table = %envelope.table,
            operation = %envelope.operation,
            "Message #{} received",
            sequence
        );

        let processed = match ProcessedRecord::new(&envelope, &self.processor_id, sequence)
            .into_record()
        {
            Ok(record) => record,
            Err(e) => {
                error!(message_sequence = sequence, error = %e, "Failed to build processed record");
                return self.dropped(DropReason::Handler);
            }
        };

        let records = match self.router.dispatch(&envelope).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    message_sequence = sequence,
                    table = %envelope.table,
                    operation = %envelope.operation,
                    error = %ConsumerError::from(e),
                    "Error processing change"
                );
                return self.dropped(DropReason::Handler);
            }
        };

        self.emitter.emit(&processed);
        for record in &records {
            self.emitter.emit(record);
        }

        self.metrics.messages_processed_total.inc();
        info!(
            "Successfully processed {} on {}",
            envelope.operation, envelope.table
        );

        ProcessingOutcome::Processed {
            records: records.len() + 1,
        }
    }

    fn dropped(&self, reason: DropReason) -> ProcessingOutcome {
        self.metrics
            .messages_dropped_total
            .with_label_values(&[reason.as_str()])
            .inc();
        ProcessingOutcome::LoggedAndDropped(reason)
    }
}
