use prometheus::{IntCounterVec, Opts};
use std::sync::OnceLock;
use tracing::warn;

/// Publish outcomes, labelled `delivered`, `failed` or `skipped`.
#[derive(Clone)]
pub struct PublisherMetrics {
    pub outcomes: IntCounterVec,
}

impl PublisherMetrics {
    /// Process-wide instance registered in the default registry.
    pub fn global() -> &'static PublisherMetrics {
        static METRICS: OnceLock<PublisherMetrics> = OnceLock::new();
        METRICS.get_or_init(PublisherMetrics::register)
    }

    fn register() -> Self {
        let outcomes = IntCounterVec::new(
            Opts::new(
                "cdc_publish_total",
                "Change events handed to the publisher, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid metric opts for cdc_publish_total");

        if let Err(e) = prometheus::default_registry().register(Box::new(outcomes.clone())) {
            warn!("Failed to register publisher metric: {}", e);
        }

        Self { outcomes }
    }

    pub fn record(&self, outcome: &str) {
        self.outcomes.with_label_values(&[outcome]).inc();
    }
}
