use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use resilience::with_retry;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::{PublishError, PublishResult};
use crate::sink::ChangeSink;

/// Kafka producer session for change events.
///
/// The session is owned and passed explicitly to whoever publishes; there is
/// no process-global producer handle.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaPublisher {
    /// Create the producer and verify the broker answers a metadata request.
    ///
    /// Fails with [`PublishError::Connection`] if the broker is unreachable.
    /// No retry here; see [`KafkaPublisher::connect_with_retry`].
    pub async fn connect(config: &PublisherConfig) -> PublishResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set(
                "message.timeout.ms",
                config.send_timeout.as_millis().to_string(),
            )
            .set("linger.ms", "5")
            .create()
            .map_err(|e| PublishError::Connection(format!("Failed to create producer: {}", e)))?;

        let publisher = Self {
            producer,
            topic: config.topic.clone(),
            send_timeout: config.send_timeout,
        };

        publisher.probe(config.connect_timeout).await?;

        info!(
            brokers = %config.brokers,
            client_id = %config.client_id,
            topic = %config.topic,
            "Kafka producer connected"
        );

        Ok(publisher)
    }

    /// `connect` under the configured retry policy (one retry after a fixed
    /// delay by default). The last error is returned once retries run out.
    pub async fn connect_with_retry(config: &PublisherConfig) -> PublishResult<Self> {
        with_retry(&config.connect_retry, "kafka_producer_connect", || {
            Self::connect(config)
        })
        .await
        .map_err(|e| e.into_last_error())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Lightweight health check by fetching topic metadata
    pub async fn probe(&self, timeout: Duration) -> PublishResult<()> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();

        // librdkafka fetches metadata synchronously
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| PublishError::Connection(format!("Metadata probe aborted: {}", e)))?
        .map_err(|e| PublishError::Connection(format!("Broker unreachable: {}", e)))
    }

    /// Flush queued messages before the process exits.
    pub async fn disconnect(&self, timeout: Duration) {
        let producer = self.producer.clone();
        let result = tokio::task::spawn_blocking(move || producer.flush(timeout)).await;

        match result {
            Ok(Ok(())) => info!("Kafka producer flushed"),
            Ok(Err(e)) => warn!(error = %e, "Kafka producer flush failed"),
            Err(e) => warn!(error = %e, "Kafka producer flush aborted"),
        }
    }
}

#[async_trait]
impl ChangeSink for KafkaPublisher {
    async fn send(&self, key: &str, payload: &[u8]) -> PublishResult<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        debug!(topic = %self.topic, key = %key, "Publishing change event");

        match tokio::time::timeout(
            self.send_timeout,
            self.producer.send(record, self.send_timeout),
        )
        .await
        {
            Ok(Ok((partition, offset))) => {
                debug!(key = %key, partition, offset, "Change event delivered");
                Ok(())
            }
            Ok(Err((err, _))) => Err(PublishError::SendFailed(err.to_string())),
            Err(_) => Err(PublishError::Timeout(self.send_timeout)),
        }
    }
}
