//! Wire envelope for database change events.
//!
//! Every mutating operation on the system of record produces exactly one
//! [`EventEnvelope`]. The API write path publishes it to the
//! `database-changes` topic and the changefeed consumer decodes it again.
//!
//! ```json
//! {
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "operation": "INSERT",
//!   "table": "todos",
//!   "data": { "id": 42, "title": "Buy milk" },
//!   "userId": 7
//! }
//! ```
//!
//! The message key is `"<table>-<OPERATION>"`, so every event of the same
//! table/operation class lands on the same partition.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

mod entity;
mod error;

pub use entity::EntityTag;
pub use error::{DecodeError, DecodeResult};

/// Topic every change event is published to.
pub const TOPIC: &str = "database-changes";

/// Log target shared by `DB_CHANGE` lines and the consumer's derived records.
pub const RECORD_LOG_TARGET: &str = "changefeed::records";

/// Mutating operation that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    /// Lowercase form used by generic change records.
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(DecodeError::Invalid(format!("unknown operation: {}", other))),
        }
    }
}

/// One change event, created once at mutation time and never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Producer wall-clock time as the producer wrote it (ISO-8601).
    /// Carried through verbatim; not monotonic across producers.
    pub timestamp: String,

    pub operation: Operation,

    /// Source table, e.g. "todos", "users", "user_tokens"
    pub table: String,

    /// Entity-shaped row data; carries the primary key when known
    pub data: Map<String, Value>,

    /// Acting principal, if any
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn new(
        operation: Operation,
        table: impl Into<String>,
        data: Map<String, Value>,
        user_id: Option<i64>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            operation,
            table: table.into(),
            data,
            user_id,
        }
    }

    /// Build an envelope from any JSON value. Non-object values are wrapped
    /// under a `value` field so the envelope stays entity-shaped.
    pub fn from_value(
        operation: Operation,
        table: impl Into<String>,
        data: Value,
        user_id: Option<i64>,
    ) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::new(operation, table, data, user_id)
    }

    /// Partition key: `"<table>-<OPERATION>"`.
    pub fn partition_key(&self) -> String {
        format!("{}-{}", self.table, self.operation)
    }

    /// Entity tag for routing, `None` for tables without a dedicated handler.
    pub fn entity(&self) -> Option<EntityTag> {
        EntityTag::from_table(&self.table)
    }

    /// Primary key of the changed row, if present.
    pub fn record_id(&self) -> Option<&Value> {
        self.data.get("id").filter(|v| !v.is_null())
    }

    /// Field of the row data, `Value::Null` when absent.
    pub fn field(&self, name: &str) -> Value {
        self.data.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Stable identity of this event, used to recognise re-deliveries.
    pub fn dedup_key(&self) -> String {
        let id = self
            .record_id()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{}:{}:{}:{}", self.table, self.operation, id, self.timestamp)
    }

    pub fn validate(&self) -> DecodeResult<()> {
        if self.table.trim().is_empty() {
            return Err(DecodeError::Invalid("table is empty".to_string()));
        }
        if self.timestamp.trim().is_empty() {
            return Err(DecodeError::Invalid("timestamp is empty".to_string()));
        }
        Ok(())
    }

    /// Serialize to the UTF-8 JSON wire format.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode and validate a message value.
    pub fn decode(payload: &[u8]) -> DecodeResult<Self> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        let envelope: EventEnvelope = serde_json::from_slice(payload)?;
        envelope.validate()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo_insert() -> EventEnvelope {
        let data = json!({
            "id": 42,
            "title": "Buy milk",
            "priority": "medium",
            "status": "pending",
            "user_id": 7
        });
        EventEnvelope::from_value(Operation::Insert, "todos", data, Some(7))
    }

    #[test]
    fn test_partition_key() {
        assert_eq!(todo_insert().partition_key(), "todos-INSERT");

        let envelope = EventEnvelope::new(Operation::Delete, "user_tokens", Map::new(), None);
        assert_eq!(envelope.partition_key(), "user_tokens-DELETE");
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(todo_insert()).unwrap();

        assert_eq!(value["operation"], "INSERT");
        assert_eq!(value["table"], "todos");
        assert_eq!(value["userId"], 7);
        assert_eq!(value["data"]["title"], "Buy milk");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_decode_reference_payload() {
        let payload = br#"{
            "timestamp": "2024-01-01T00:00:00.000Z",
            "operation": "UPDATE",
            "table": "todos",
            "data": {"id": 1, "status": "completed"},
            "userId": null
        }"#;

        let envelope = EventEnvelope::decode(payload).unwrap();
        assert_eq!(envelope.operation, Operation::Update);
        assert_eq!(envelope.user_id, None);
        assert_eq!(envelope.record_id(), Some(&json!(1)));
        assert_eq!(envelope.entity(), Some(EntityTag::Todos));
    }

    #[test]
    fn test_decode_missing_user_id_defaults_to_none() {
        let payload = br#"{"timestamp":"2024-01-01T00:00:00Z","operation":"DELETE","table":"audit","data":{}}"#;
        let envelope = EventEnvelope::decode(payload).unwrap();
        assert_eq!(envelope.user_id, None);
        assert_eq!(envelope.entity(), None);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            EventEnvelope::decode(b"not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            EventEnvelope::decode(b""),
            Err(DecodeError::EmptyPayload)
        ));

        let unknown_op = br#"{"timestamp":"2024-01-01T00:00:00Z","operation":"UPSERT","table":"todos","data":{}}"#;
        assert!(EventEnvelope::decode(unknown_op).is_err());

        let empty_table = br#"{"timestamp":"2024-01-01T00:00:00Z","operation":"INSERT","table":"","data":{}}"#;
        assert!(matches!(
            EventEnvelope::decode(empty_table),
            Err(DecodeError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_value_wraps_scalars() {
        let envelope = EventEnvelope::from_value(Operation::Insert, "counters", json!(5), None);
        assert_eq!(envelope.data.get("value"), Some(&json!(5)));

        let envelope = EventEnvelope::from_value(Operation::Delete, "todos", Value::Null, None);
        assert!(envelope.data.is_empty());
        assert!(envelope.record_id().is_none());
    }

    #[test]
    fn test_dedup_key_is_stable() {
        let envelope = todo_insert();
        let copy = EventEnvelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(envelope.dedup_key(), copy.dedup_key());
        assert!(envelope.dedup_key().starts_with("todos:INSERT:42:"));
    }

    #[test]
    fn test_timestamp_survives_decode_verbatim() {
        let millis = br#"{"timestamp":"2024-01-01T00:00:00.000Z","operation":"INSERT","table":"todos","data":{"id":1}}"#;
        let envelope = EventEnvelope::decode(millis).unwrap();
        assert_eq!(envelope.timestamp, "2024-01-01T00:00:00.000Z");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["timestamp"], "2024-01-01T00:00:00.000Z");

        let offset = br#"{"timestamp":"2024-01-01T09:30:00+09:00","operation":"INSERT","table":"todos","data":{}}"#;
        let envelope = EventEnvelope::decode(offset).unwrap();
        assert_eq!(envelope.timestamp, "2024-01-01T09:30:00+09:00");
    }

    #[test]
    fn test_decode_accepts_timestamp_without_offset() {
        let payload = br#"{"timestamp":"2024-01-01T00:00:00","operation":"UPDATE","table":"users","data":{"id":5}}"#;
        let envelope = EventEnvelope::decode(payload).unwrap();
        assert_eq!(envelope.timestamp, "2024-01-01T00:00:00");
        assert_eq!(envelope.dedup_key(), "users:UPDATE:5:2024-01-01T00:00:00");
    }

    #[test]
    fn test_decode_rejects_empty_timestamp() {
        let payload = br#"{"timestamp":"","operation":"INSERT","table":"todos","data":{}}"#;
        assert!(matches!(
            EventEnvelope::decode(payload),
            Err(DecodeError::Invalid(_))
        ));
    }

    #[test]
    fn test_new_stamps_millisecond_utc() {
        let envelope = todo_insert();
        assert!(envelope.timestamp.ends_with('Z'));
        // "YYYY-MM-DDTHH:MM:SS.mmmZ"
        assert_eq!(envelope.timestamp.len(), 24);
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("DELETE".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("delete".parse::<Operation>().is_err());
        assert_eq!(Operation::Update.as_lowercase(), "update");
    }
}
