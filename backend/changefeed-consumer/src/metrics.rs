use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

/// Metrics for consumer monitoring
#[derive(Clone)]
pub struct ConsumerMetrics {
    /// Total number of Kafka consumer errors
    pub consumer_errors_total: IntCounter,
    /// Current consecutive error count (resets on success)
    pub consecutive_errors: IntGauge,
    /// Messages whose records were emitted
    pub messages_processed_total: IntCounter,
    /// Messages logged and dropped, by reason (`decode`, `handler`)
    pub messages_dropped_total: IntCounterVec,
    /// Consumer health status (1 = healthy, 0 = unhealthy)
    pub consumer_healthy: IntGauge,
    /// Current backoff duration in seconds
    pub backoff_seconds: IntGauge,
    /// 1 while the consume loop is running
    pub consumer_running: IntGauge,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let consumer_errors_total = IntCounter::new(
            "changefeed_consumer_errors_total",
            "Total number of Kafka consumer errors encountered",
        )
        .expect("valid metric for changefeed_consumer_errors_total");

        let consecutive_errors = IntGauge::new(
            "changefeed_consumer_consecutive_errors",
            "Current number of consecutive Kafka consumer errors",
        )
        .expect("valid metric for changefeed_consumer_consecutive_errors");

        let messages_processed_total = IntCounter::new(
            "changefeed_messages_processed_total",
            "Total number of change events processed",
        )
        .expect("valid metric for changefeed_messages_processed_total");

        let messages_dropped_total = IntCounterVec::new(
            Opts::new(
                "changefeed_messages_dropped_total",
                "Total number of change events logged and dropped",
            ),
            &["reason"],
        )
        .expect("valid metric for changefeed_messages_dropped_total");

        let consumer_healthy = IntGauge::new(
            "changefeed_consumer_healthy",
            "Consumer health status (1 = healthy, 0 = unhealthy)",
        )
        .expect("valid metric for changefeed_consumer_healthy");

        let backoff_seconds = IntGauge::new(
            "changefeed_consumer_backoff_seconds",
            "Current backoff duration in seconds",
        )
        .expect("valid metric for changefeed_consumer_backoff_seconds");

        let consumer_running = IntGauge::new(
            "changefeed_consumer_running",
            "Whether the consume loop is running (1 = running)",
        )
        .expect("valid metric for changefeed_consumer_running");

        // A second instance in the same process keeps its own unregistered collectors
        for metric in [
            Box::new(consumer_errors_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(consecutive_errors.clone()),
            Box::new(messages_processed_total.clone()),
            Box::new(messages_dropped_total.clone()),
            Box::new(consumer_healthy.clone()),
            Box::new(backoff_seconds.clone()),
            Box::new(consumer_running.clone()),
        ] {
            let _ = registry.register(metric);
        }

        consumer_healthy.set(1);

        Self {
            consumer_errors_total,
            consecutive_errors,
            messages_processed_total,
            messages_dropped_total,
            consumer_healthy,
            backoff_seconds,
            consumer_running,
        }
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregates maintained by the todo analytics step
#[derive(Clone)]
pub struct AnalyticsMetrics {
    /// First-seen todo changes by action (`create`, `update`, `delete`)
    pub todo_changes: IntCounterVec,
}

impl AnalyticsMetrics {
    pub fn new() -> Self {
        let todo_changes = IntCounterVec::new(
            Opts::new(
                "changefeed_todo_analytics_total",
                "Distinct todo changes seen by analytics, by action",
            ),
            &["action"],
        )
        .expect("valid metric for changefeed_todo_analytics_total");

        let _ = prometheus::default_registry().register(Box::new(todo_changes.clone()));

        Self { todo_changes }
    }
}

impl Default for AnalyticsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
