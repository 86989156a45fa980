/// Policies used by the changefeed publisher and consumer
use crate::backoff::ErrorBackoff;
use crate::retry::RetryConfig;
use std::time::Duration;

/// Consumer startup (connect + subscribe)
///
/// - 5 attempts in total
/// - 5s doubling to a 60s cap, with jitter
///
/// Exhaustion is fatal: the process exits non-zero and the orchestrator
/// decides whether to restart it.
pub fn startup_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 4,
        initial_backoff: Duration::from_secs(5),
        max_backoff: Duration::from_secs(60),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

/// Producer connect: one retry after a fixed 5s delay, then the error surfaces
/// to the caller.
pub fn producer_connect_retry() -> RetryConfig {
    RetryConfig::fixed(Duration::from_secs(5), 1)
}

/// Steady-state consumer receive errors: 1s doubling to 60s, never gives up.
pub fn consumer_error_backoff() -> ErrorBackoff {
    ErrorBackoff::new(Duration::from_secs(1), Duration::from_secs(60))
}
