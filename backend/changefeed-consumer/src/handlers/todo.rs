use async_trait::async_trait;
use change_event::{EventEnvelope, Operation};
use serde_json::json;

use super::analytics::{TodoAction, TodoAnalytics};
use super::{ChangeHandler, HandlerResult};
use crate::error::HandlerError;
use crate::records::{DerivedRecord, RecordKind};

/// `todos` changes: one lifecycle record plus one analytics record.
#[derive(Clone)]
pub struct TodoHandler {
    processor_id: String,
    analytics: TodoAnalytics,
}

impl TodoHandler {
    pub fn new(processor_id: impl Into<String>, analytics: TodoAnalytics) -> Self {
        Self {
            processor_id: processor_id.into(),
            analytics,
        }
    }

    fn lifecycle_record(&self, envelope: &EventEnvelope) -> DerivedRecord {
        match envelope.operation {
            Operation::Insert => DerivedRecord::new(
                RecordKind::TodoCreated,
                json!({
                    "event": "new_todo_detected",
                    "todoId": envelope.field("id"),
                    "title": envelope.field("title"),
                    "priority": envelope.field("priority"),
                    "userId": envelope.field("user_id"),
                    "status": envelope.field("status"),
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
            Operation::Update => DerivedRecord::new(
                RecordKind::TodoUpdated,
                json!({
                    "event": "todo_modification_detected",
                    "todoId": envelope.field("id"),
                    "status": envelope.field("status"),
                    "priority": envelope.field("priority"),
                    "title": envelope.field("title"),
                    "userId": envelope.user_id,
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
            Operation::Delete => DerivedRecord::new(
                RecordKind::TodoDeleted,
                json!({
                    "event": "todo_removal_detected",
                    "todoId": envelope.field("id"),
                    "userId": envelope.user_id,
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
        }
    }
}

#[async_trait]
impl ChangeHandler for TodoHandler {
    fn name(&self) -> &'static str {
        "todo"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        if envelope.record_id().is_none() {
            return Err(HandlerError::MissingField {
                table: envelope.table.clone(),
                operation: envelope.operation,
                field: "id",
            });
        }

        let action = match envelope.operation {
            Operation::Insert => TodoAction::Create,
            Operation::Update => TodoAction::Update,
            Operation::Delete => TodoAction::Delete,
        };

        Ok(vec![
            self.lifecycle_record(envelope),
            self.analytics.process(action, envelope),
        ])
    }
}
