use async_trait::async_trait;
use change_event::{EventEnvelope, Operation};
use serde_json::json;

use super::generic::GenericHandler;
use super::{ChangeHandler, HandlerResult};
use crate::records::{DerivedRecord, RecordKind};

#[derive(Debug, Clone)]
pub struct UserHandler {
    processor_id: String,
}

impl UserHandler {
    pub fn new(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
        }
    }
}

#[async_trait]
impl ChangeHandler for UserHandler {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let record = match envelope.operation {
            Operation::Insert => DerivedRecord::new(
                RecordKind::UserRegistered,
                json!({
                    "event": "new_user_registration_detected",
                    "userId": envelope.field("id"),
                    "username": envelope.field("username"),
                    "email": envelope.field("email"),
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
            Operation::Update => DerivedRecord::new(
                RecordKind::UserProfileUpdated,
                json!({
                    "event": "user_profile_change_detected",
                    "userId": envelope.field("id"),
                    "email": envelope.field("email"),
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
            // Account deletion has no dedicated record
            Operation::Delete => GenericHandler::record(envelope, &self.processor_id),
        };

        Ok(vec![record])
    }
}
