/// Retry policy with exponential backoff and jitter
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff (1.0 = fixed delay)
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fixed delay between a bounded number of retries.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Max retries ({retries}) exceeded, last error: {last_error}")]
    MaxRetriesExceeded { retries: u32, last_error: E },
}

impl<E> RetryError<E> {
    /// Error returned by the final attempt.
    pub fn into_last_error(self) -> E {
        match self {
            RetryError::MaxRetriesExceeded { last_error, .. } => last_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::MaxRetriesExceeded { retries, .. } => retries.saturating_add(1),
        }
    }
}

/// Execute a future with retry logic.
///
/// `operation` names the call in log lines. Gives up after
/// `config.max_retries` retries and returns the last error.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retry = 0;

    loop {
        match f().await {
            Ok(result) => {
                if retry > 0 {
                    info!(operation, attempts = retry + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if retry >= config.max_retries {
                    warn!(
                        operation,
                        max_retries = config.max_retries,
                        error = %e,
                        "Max retries reached, giving up"
                    );
                    return Err(RetryError::MaxRetriesExceeded {
                        retries: config.max_retries,
                        last_error: e,
                    });
                }

                retry += 1;
                let delay = apply_jitter(config.delay_for(retry), config.jitter);

                warn!(
                    operation,
                    error = %e,
                    "Retry attempt {}/{}, waiting {:?}",
                    retry,
                    config.max_retries,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
