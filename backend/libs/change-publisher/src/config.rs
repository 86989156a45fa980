use resilience::{presets, RetryConfig};
use std::time::Duration;

/// Producer configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Single bootstrap broker (host:port)
    pub brokers: String,
    /// Client id reported to the broker
    pub client_id: String,
    pub topic: String,
    /// Bound on one send, including local queueing
    pub send_timeout: Duration,
    /// Bound on the connect probe
    pub connect_timeout: Duration,
    /// Retry policy for `connect_with_retry`
    pub connect_retry: RetryConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "api-service".to_string(),
            topic: change_event::TOPIC.to_string(),
            send_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            connect_retry: presets::producer_connect_retry(),
        }
    }
}

impl PublisherConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            brokers: std::env::var("KAFKA_BROKER")
                .or_else(|_| std::env::var("KAFKA_BROKERS"))
                .unwrap_or(defaults.brokers),
            client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.client_id),
            topic: std::env::var("KAFKA_TOPIC").unwrap_or(defaults.topic),
            send_timeout: std::env::var("KAFKA_SEND_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_timeout),
            connect_timeout: std::env::var("KAFKA_CONNECTION_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            connect_retry: defaults.connect_retry,
        }
    }
}
