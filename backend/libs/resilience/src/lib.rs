/// Resilience patterns for the changefeed pipeline
///
/// - **Retry**: bounded attempts with exponential backoff and optional jitter.
///   Used for broker connect at startup, where an unbounded loop would hide a
///   dead broker behind endless restarts.
/// - **Error backoff**: consecutive-error tracking for long-running loops that
///   must stay alive (steady-state consumer receive errors).
/// - **Presets**: the policies the publisher and consumer actually use.
///
/// # Example: bounded startup retry
///
/// ```rust,no_run
/// use resilience::{presets, with_retry};
///
/// #[tokio::main]
/// async fn main() {
///     let policy = presets::startup_retry();
///
///     let result = with_retry(&policy, "broker_connect", || async {
///         // Connect to the broker here
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```

pub mod backoff;
pub mod presets;
pub mod retry;

// Re-export main types for convenience
pub use backoff::ErrorBackoff;
pub use retry::{with_retry, RetryConfig, RetryError};
