//! Structured records derived from change events.
//!
//! Every record is a JSON object tagged with a [`RecordKind`]. The default
//! [`TracingEmitter`] writes each one as an `info` line under the
//! `changefeed::records` target:
//!
//! ```text
//! TODO_CREATED: {"event":"new_todo_detected","todoId":42,...}
//! ```

use change_event::{EventEnvelope, RECORD_LOG_TARGET};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::info;

/// Version reported in `consumerVersion`
pub const CONSUMER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ProcessedDbChange,
    TodoCreated,
    TodoUpdated,
    TodoDeleted,
    UserRegistered,
    UserProfileUpdated,
    UserTokenCreated,
    UserTokenRevoked,
    GenericDbChange,
    AnalyticsProcessing,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::ProcessedDbChange => "PROCESSED_DB_CHANGE",
            RecordKind::TodoCreated => "TODO_CREATED",
            RecordKind::TodoUpdated => "TODO_UPDATED",
            RecordKind::TodoDeleted => "TODO_DELETED",
            RecordKind::UserRegistered => "USER_REGISTERED",
            RecordKind::UserProfileUpdated => "USER_PROFILE_UPDATED",
            RecordKind::UserTokenCreated => "USER_TOKEN_CREATED",
            RecordKind::UserTokenRevoked => "USER_TOKEN_REVOKED",
            RecordKind::GenericDbChange => "GENERIC_DB_CHANGE",
            RecordKind::AnalyticsProcessing => "ANALYTICS_PROCESSING",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged record ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub kind: RecordKind,
    pub body: Value,
}

impl DerivedRecord {
    pub fn new(kind: RecordKind, body: Value) -> Self {
        Self { kind, body }
    }

    /// Field of the body, `Value::Null` when absent
    pub fn get(&self, field: &str) -> &Value {
        self.body.get(field).unwrap_or(&Value::Null)
    }

    /// Sorted top-level field names, for shape comparisons
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = match &self.body {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        names.sort_unstable();
        names
    }
}

/// Envelope enriched with consumer metadata (`PROCESSED_DB_CHANGE`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord<'a> {
    #[serde(flatten)]
    pub envelope: &'a EventEnvelope,
    pub processed_at: DateTime<Utc>,
    pub processor_id: &'a str,
    pub message_type: &'static str,
    /// Position of the message within this process lifetime
    pub message_sequence: u64,
    pub consumer_version: &'static str,
}

impl<'a> ProcessedRecord<'a> {
    pub fn new(envelope: &'a EventEnvelope, processor_id: &'a str, message_sequence: u64) -> Self {
        Self {
            envelope,
            processed_at: Utc::now(),
            processor_id,
            message_type: "DATABASE_CHANGE_PROCESSED",
            message_sequence,
            consumer_version: CONSUMER_VERSION,
        }
    }

    pub fn into_record(self) -> Result<DerivedRecord, serde_json::Error> {
        Ok(DerivedRecord::new(
            RecordKind::ProcessedDbChange,
            serde_json::to_value(&self)?,
        ))
    }
}

/// Destination for derived records
pub trait RecordEmitter: Send + Sync {
    fn emit(&self, record: &DerivedRecord);
}

/// Writes records to the log stream
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl RecordEmitter for TracingEmitter {
    fn emit(&self, record: &DerivedRecord) {
        let json = record.body.to_string();
        info!(
            target: RECORD_LOG_TARGET,
            kind = record.kind.as_str(),
            record = %json,
            "{}: {}",
            record.kind,
            json
        );
    }
}
