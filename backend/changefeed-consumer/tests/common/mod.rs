//! In-memory broker for end-to-end tests.
//!
//! `MemoryTopic` is a single-partition topic: the producer side implements
//! `ChangeSink`, the consumer side implements `MessageSource`.

#![allow(dead_code)]

use async_trait::async_trait;
use change_publisher::{ChangeSink, PublishResult};
use changefeed_consumer::handlers::TodoAnalytics;
use changefeed_consumer::metrics::ConsumerMetrics;
use changefeed_consumer::{
    ConsumerService, DerivedRecord, MessageProcessor, MessageSource, RawMessage, RecordEmitter,
    RecordKind, Result, Router, StatusTracker,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TOPIC: &str = "database-changes";

pub struct MemoryTopic {
    tx: mpsc::UnboundedSender<RawMessage>,
    next_offset: AtomicI64,
}

impl MemoryTopic {
    pub fn new() -> (Arc<Self>, MemorySource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let topic = Arc::new(Self {
            tx,
            next_offset: AtomicI64::new(0),
        });
        (topic, MemorySource::new(rx))
    }

    /// Append a raw message value, bypassing the publisher
    pub fn push_raw(&self, key: &str, payload: &[u8]) {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(RawMessage {
            topic: TOPIC.to_string(),
            partition: 0,
            offset,
            key: Some(key.as_bytes().to_vec()),
            payload: Some(payload.to_vec()),
        });
    }
}

/// Producer handle onto a shared topic
pub struct TopicSink(pub Arc<MemoryTopic>);

#[async_trait]
impl ChangeSink for TopicSink {
    async fn send(&self, key: &str, payload: &[u8]) -> PublishResult<()> {
        self.0.push_raw(key, payload);
        Ok(())
    }
}

pub struct MemorySource {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RawMessage>>,
    acked: Mutex<Vec<i64>>,
    closed: AtomicBool,
}

impl MemorySource {
    fn new(rx: mpsc::UnboundedReceiver<RawMessage>) -> Self {
        Self {
            rx: tokio::sync::Mutex::new(rx),
            acked: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn acked(&self) -> Vec<i64> {
        self.acked.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next_message(&self) -> Option<Result<RawMessage>> {
        self.rx.lock().await.recv().await.map(Ok)
    }

    async fn ack(&self, message: &RawMessage) -> Result<()> {
        self.acked.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps every emitted record in order
#[derive(Default)]
pub struct RecordLog(Mutex<Vec<DerivedRecord>>);

impl RecordLog {
    pub fn all(&self) -> Vec<DerivedRecord> {
        self.0.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: RecordKind) -> Vec<DerivedRecord> {
        self.all().into_iter().filter(|r| r.kind == kind).collect()
    }

    pub fn kinds(&self) -> Vec<RecordKind> {
        self.all().iter().map(|r| r.kind).collect()
    }
}

impl RecordEmitter for RecordLog {
    fn emit(&self, record: &DerivedRecord) {
        self.0.lock().unwrap().push(record.clone());
    }
}

pub fn processor_with(router: Router, log: Arc<RecordLog>) -> MessageProcessor {
    MessageProcessor::new(router, log, "todo-consumer-service", ConsumerMetrics::new())
}

pub fn standard_router() -> Router {
    Router::standard(
        "todo-consumer-service",
        TodoAnalytics::new(Duration::from_secs(3600)),
    )
}

pub fn service<S: MessageSource>(
    source: S,
    router: Router,
    log: Arc<RecordLog>,
) -> Arc<ConsumerService<S>> {
    Arc::new(ConsumerService::new(
        source,
        processor_with(router, log),
        StatusTracker::new(),
        ConsumerMetrics::new(),
    ))
}

/// Envelope JSON as the API would put it on the wire
pub fn envelope_json(operation: &str, table: &str, data: serde_json::Value, user_id: Option<i64>) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "timestamp": "2024-01-01T00:00:00Z",
        "operation": operation,
        "table": table,
        "data": data,
        "userId": user_id,
    }))
    .unwrap()
}
