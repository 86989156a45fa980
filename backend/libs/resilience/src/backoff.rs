/// Consecutive-error backoff for long-running loops
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Error state for a loop that must keep running through transient failures.
///
/// Each consecutive error doubles the delay, starting at `min` and capped at
/// `max`. A success resets the count. Safe to share behind `Arc`.
#[derive(Debug)]
pub struct ErrorBackoff {
    consecutive_count: AtomicU32,
    /// Timestamp of last successful operation (Unix millis)
    last_success_ms: AtomicU64,
    min: Duration,
    max: Duration,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ErrorBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            consecutive_count: AtomicU32::new(0),
            last_success_ms: AtomicU64::new(now_ms()),
            min,
            max: max.max(min),
        }
    }

    /// Record a successful operation, resetting error count
    pub fn record_success(&self) {
        self.consecutive_count.store(0, Ordering::SeqCst);
        self.last_success_ms.store(now_ms(), Ordering::SeqCst);
    }

    /// Record an error, returning the new consecutive count
    pub fn record_error(&self) -> u32 {
        self.consecutive_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_count.load(Ordering::SeqCst)
    }

    pub fn time_since_success(&self) -> Duration {
        let last = self.last_success_ms.load(Ordering::SeqCst);
        Duration::from_millis(now_ms().saturating_sub(last))
    }

    /// Delay to apply before the next attempt.
    pub fn current_backoff(&self) -> Duration {
        let errors = self.consecutive_errors();
        if errors <= 1 {
            return self.min;
        }

        let factor = 2u32.saturating_pow((errors - 1).min(31));
        self.min.saturating_mul(factor).min(self.max)
    }
}

impl Default for ErrorBackoff {
    /// 1s doubling to a 60s cap
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
