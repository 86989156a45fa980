use async_trait::async_trait;
use change_event::{EventEnvelope, Operation};
use serde_json::json;

use super::{ChangeHandler, HandlerResult};
use crate::records::{DerivedRecord, RecordKind};

/// `user_tokens` changes. An INSERT is a login session; an UPDATE or DELETE
/// of a token row is a logout or revocation.
#[derive(Debug, Clone)]
pub struct TokenHandler {
    processor_id: String,
}

impl TokenHandler {
    pub fn new(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
        }
    }
}

#[async_trait]
impl ChangeHandler for TokenHandler {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> HandlerResult {
        let record = match envelope.operation {
            Operation::Insert => DerivedRecord::new(
                RecordKind::UserTokenCreated,
                json!({
                    "event": "user_login_session_detected",
                    "userId": envelope.field("user_id"),
                    "expiresAt": envelope.field("expires_at"),
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
            Operation::Update | Operation::Delete => DerivedRecord::new(
                RecordKind::UserTokenRevoked,
                json!({
                    "event": "user_logout_session_detected",
                    "isRevoked": envelope.field("is_revoked"),
                    "userId": envelope.user_id,
                    "timestamp": envelope.timestamp,
                    "processedBy": self.processor_id,
                }),
            ),
        };

        Ok(vec![record])
    }
}
