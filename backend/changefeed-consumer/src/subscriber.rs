use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConsumerConfig;
use crate::error::{ConsumerError, Result};

/// Owned copy of one delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// Pull-based message source for the consume loop.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next message, or `None` once the source is exhausted
    async fn next_message(&self) -> Option<Result<RawMessage>>;

    /// Mark the message as handled so its offset can be committed
    async fn ack(&self, message: &RawMessage) -> Result<()>;

    /// Commit handled offsets and leave the group
    async fn close(&self) -> Result<()>;
}

/// Consumer group member on the change topic.
///
/// Offsets are stored only when a message is acked and committed in the
/// background by librdkafka; heartbeats come from its own thread.
pub struct KafkaSubscriber {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaSubscriber {
    /// Create the consumer and verify the broker answers a metadata request.
    pub async fn connect(config: &KafkaConsumerConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "latest")
            .set(
                "session.timeout.ms",
                config.session_timeout.as_millis().to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                config.heartbeat_interval.as_millis().to_string(),
            )
            .set(
                "socket.connection.setup.timeout.ms",
                config.connect_timeout.as_millis().to_string(),
            )
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                error!("Failed to create Kafka consumer: {}", e);
                ConsumerError::Connection(e.to_string())
            })?;

        let consumer = Arc::new(consumer);
        let probe = Arc::clone(&consumer);
        let topic = config.topic.clone();
        let timeout = config.connect_timeout;

        // librdkafka fetches metadata synchronously
        tokio::task::spawn_blocking(move || {
            probe
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| ConsumerError::Connection(format!("Metadata probe aborted: {}", e)))?
        .map_err(|e| ConsumerError::Connection(format!("Broker unreachable: {}", e)))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            "Kafka consumer connected"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    /// Join the group on the change topic. Requires a connected session.
    pub fn subscribe(&self) -> Result<()> {
        self.consumer.subscribe(&[self.topic.as_str()]).map_err(|e| {
            error!("Failed to subscribe to topic {}: {}", self.topic, e);
            ConsumerError::Subscription(e.to_string())
        })?;

        info!(topic = %self.topic, "Subscribed to change topic");
        Ok(())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MessageSource for KafkaSubscriber {
    async fn next_message(&self) -> Option<Result<RawMessage>> {
        let message = match self.consumer.recv().await {
            Ok(msg) => RawMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                key: msg.key().map(<[u8]>::to_vec),
                payload: msg.payload().map(<[u8]>::to_vec),
            },
            Err(e) => return Some(Err(ConsumerError::Receive(e.to_string()))),
        };

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Received change message"
        );

        Some(Ok(message))
    }

    async fn ack(&self, message: &RawMessage) -> Result<()> {
        // Committed offset is the next one to read
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| ConsumerError::Commit(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let consumer = Arc::clone(&self.consumer);

        let committed = tokio::task::spawn_blocking(move || {
            let result = consumer.commit_consumer_state(CommitMode::Sync);
            consumer.unsubscribe();
            result
        })
        .await
        .map_err(|e| ConsumerError::Commit(format!("Commit task aborted: {}", e)))?;

        match committed {
            Ok(()) => info!("Committed consumer offsets"),
            // Nothing stored since the last auto-commit
            Err(rdkafka::error::KafkaError::ConsumerCommit(
                rdkafka::types::RDKafkaErrorCode::NoOffset,
            )) => debug!("No new offsets to commit"),
            Err(e) => {
                warn!(error = %e, "Final offset commit failed");
                return Err(ConsumerError::Commit(e.to_string()));
            }
        }

        Ok(())
    }
}
