use anyhow::{anyhow, bail, Result};
use resilience::RetryConfig;
use std::str::FromStr;
use std::time::Duration;

/// Kafka consumer settings
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    /// Single bootstrap broker (host:port)
    pub brokers: String,
    pub topic: String,
    /// Fixed group so instances share partitions instead of duplicating work
    pub group_id: String,
    pub client_id: String,
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Bound on the metadata probe at connect
    pub connect_timeout: Duration,
}

impl Default for KafkaConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka:9092".to_string(),
            topic: change_event::TOPIC.to_string(),
            group_id: "database-change-processors".to_string(),
            client_id: "todo-consumer-service".to_string(),
            session_timeout: Duration::from_millis(30_000),
            heartbeat_interval: Duration::from_millis(3_000),
            connect_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Consumer service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConsumerConfig,
    /// Retry policy for the whole connect + subscribe sequence
    pub startup_retry: RetryConfig,
    /// How long shutdown waits for the in-flight message
    pub shutdown_grace: Duration,
    pub http_port: u16,
    pub http_enabled: bool,
    /// Stamped on every derived record as `processorId` / `processedBy`
    pub processor_id: String,
    /// How long analytics remembers envelopes it already counted
    pub dedup_retention: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka: KafkaConsumerConfig::default(),
            startup_retry: resilience::presets::startup_retry(),
            shutdown_grace: Duration::from_secs(10),
            http_port: 8090,
            http_enabled: true,
            processor_id: "todo-consumer-service".to_string(),
            dedup_retention: Duration::from_secs(86_400),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let kafka_defaults = defaults.kafka;

        // 0 is treated as a single attempt
        let startup_attempts: u32 =
            env_parse("STARTUP_MAX_ATTEMPTS", defaults.startup_retry.max_attempts())?;
        let startup_retry = RetryConfig {
            max_retries: startup_attempts.saturating_sub(1),
            initial_backoff: env_millis("STARTUP_INITIAL_BACKOFF_MS", defaults.startup_retry.initial_backoff)?,
            max_backoff: env_millis("STARTUP_MAX_BACKOFF_MS", defaults.startup_retry.max_backoff)?,
            ..defaults.startup_retry
        };

        let config = Self {
            kafka: KafkaConsumerConfig {
                brokers: std::env::var("KAFKA_BROKER")
                    .or_else(|_| std::env::var("KAFKA_BROKERS"))
                    .unwrap_or(kafka_defaults.brokers),
                topic: std::env::var("KAFKA_TOPIC").unwrap_or(kafka_defaults.topic),
                group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(kafka_defaults.group_id),
                client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(kafka_defaults.client_id),
                session_timeout: env_millis("KAFKA_SESSION_TIMEOUT_MS", kafka_defaults.session_timeout)?,
                heartbeat_interval: env_millis(
                    "KAFKA_HEARTBEAT_INTERVAL_MS",
                    kafka_defaults.heartbeat_interval,
                )?,
                connect_timeout: env_millis(
                    "KAFKA_CONNECTION_TIMEOUT_MS",
                    kafka_defaults.connect_timeout,
                )?,
            },
            startup_retry,
            shutdown_grace: Duration::from_secs(env_parse(
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
            http_port: env_parse("PORT", defaults.http_port)?,
            http_enabled: env_flag("STATUS_HTTP_ENABLED", defaults.http_enabled)?,
            processor_id: std::env::var("PROCESSOR_ID").unwrap_or(defaults.processor_id),
            dedup_retention: Duration::from_secs(env_parse(
                "ANALYTICS_DEDUP_RETENTION_SECS",
                defaults.dedup_retention.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.trim().is_empty() {
            bail!("KAFKA_BROKER must not be empty");
        }
        if self.kafka.topic.trim().is_empty() {
            bail!("KAFKA_TOPIC must not be empty");
        }
        if self.kafka.group_id.trim().is_empty() {
            bail!("KAFKA_GROUP_ID must not be empty");
        }
        // librdkafka requires heartbeats well inside the session timeout
        if self.kafka.heartbeat_interval.as_millis() * 3 >= self.kafka.session_timeout.as_millis() {
            bail!(
                "KAFKA_HEARTBEAT_INTERVAL_MS ({}) must be below one third of KAFKA_SESSION_TIMEOUT_MS ({})",
                self.kafka.heartbeat_interval.as_millis(),
                self.kafka.session_timeout.as_millis()
            );
        }
        if self.processor_id.trim().is_empty() {
            bail!("PROCESSOR_ID must not be empty");
        }
        Ok(())
    }
}

/// Unset or blank keeps the default; anything else must parse.
fn parse_value<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, value)),
    }
}

fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("{} must be a boolean, got {:?}", key, other),
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    parse_value(key, std::env::var(key).ok(), default)
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    parse_flag(key, std::env::var(key).ok(), default)
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    let millis = env_parse(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
