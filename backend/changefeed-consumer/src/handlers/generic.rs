use async_trait::async_trait;
use change_event::EventEnvelope;
use serde_json::json;

use super::{ChangeHandler, HandlerResult};
use crate::records::{DerivedRecord, RecordKind};

/// Fallback for unregistered tables and for operations an entity handler
/// has no dedicated record for.
#[derive(Debug, Clone)]
pub struct GenericHandler {
    processor_id: String,
}

impl GenericHandler {
    pub fn new(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
        }
    }

    pub fn record(envelope: &EventEnvelope, processor_id: &str) -> DerivedRecord {
        DerivedRecord::new(
            RecordKind::GenericDbChange,
            json!({
                "event": "database_change_detected",
                "table": envelope.table,
                "operation": envelope.operation.as_lowercase(),
                "recordId": envelope.field("id"),
                "userId": envelope.user_id,
                "timestamp": envelope.timestamp,
                "processedBy": processor_id,
            }),
        )
    }
}

#[async_trait]
impl ChangeHandler for GenericHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        Ok(vec![Self::record(envelope, &self.processor_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use change_event::Operation;

    #[tokio::test]
    async fn test_generic_record_shape() {
        let handler = GenericHandler::new("proc-1");
        let envelope = EventEnvelope::from_value(
            Operation::Update,
            "audit_log",
            json!({"id": "a-1", "note": "x"}),
            Some(4),
        );

        let records = handler.handle(&envelope).await.unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.kind, RecordKind::GenericDbChange);
        assert_eq!(record.get("event"), &json!("database_change_detected"));
        assert_eq!(record.get("table"), &json!("audit_log"));
        assert_eq!(record.get("operation"), &json!("update"));
        assert_eq!(record.get("recordId"), &json!("a-1"));
        assert_eq!(record.get("userId"), &json!(4));
        assert_eq!(record.get("processedBy"), &json!("proc-1"));
    }

    #[tokio::test]
    async fn test_generic_tolerates_missing_id() {
        let handler = GenericHandler::new("proc-1");
        let envelope = EventEnvelope::from_value(Operation::Delete, "sessions", json!({}), None);

        let records = handler.handle(&envelope).await.unwrap();
        assert_eq!(records[0].get("recordId"), &serde_json::Value::Null);
        assert_eq!(records[0].get("userId"), &serde_json::Value::Null);
    }
}
