use async_trait::async_trait;

use crate::error::PublishResult;

/// Transport for encoded change events.
///
/// Implemented by [`crate::KafkaPublisher`]; tests substitute an in-memory
/// sink or one that simulates a broker outage.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Send one message value under the given partition key.
    async fn send(&self, key: &str, payload: &[u8]) -> PublishResult<()>;
}
