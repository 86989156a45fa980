//! Startup ordering, the consume loop, status and graceful shutdown.
//!
//! Startup is `connect` then `subscribe` then `run`, retried as a whole under
//! a bounded policy. Shutdown is cooperative: the loop checks the shutdown
//! flag between messages, so the in-flight message always finishes unless it
//! overruns the grace period.

use chrono::{DateTime, Utc};
use resilience::{with_retry, ErrorBackoff, RetryConfig};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ConsumerError, Result};
use crate::metrics::ConsumerMetrics;
use crate::pipeline::MessageProcessor;
use crate::subscriber::MessageSource;

/// Threshold for consecutive errors before marking consumer as unhealthy
pub const UNHEALTHY_ERROR_THRESHOLD: u32 = 5;

/// Threshold for consecutive errors before emitting critical warning
pub const CRITICAL_ERROR_THRESHOLD: u32 = 10;

/// No successful receive for this long, with errors pending, is unhealthy
const STALE_SUCCESS_LIMIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatus {
    pub is_running: bool,
    pub messages_processed: u64,
    pub start_time: DateTime<Utc>,
}

/// `/status` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(flatten)]
    pub status: ConsumerStatus,
    pub consecutive_errors: u32,
    pub healthy: bool,
}

struct StatusInner {
    running: AtomicBool,
    messages: AtomicU64,
    start_time: DateTime<Utc>,
    backoff: ErrorBackoff,
}

/// Process-wide consumer state; written by the consume loop, read by the
/// status endpoints.
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<StatusInner>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::with_backoff(resilience::presets::consumer_error_backoff())
    }

    pub fn with_backoff(backoff: ErrorBackoff) -> Self {
        Self {
            inner: Arc::new(StatusInner {
                running: AtomicBool::new(false),
                messages: AtomicU64::new(0),
                start_time: Utc::now(),
                backoff,
            }),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.inner.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn record_message(&self) -> u64 {
        self.inner.messages.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn messages_processed(&self) -> u64 {
        self.inner.messages.load(Ordering::SeqCst)
    }

    pub fn backoff(&self) -> &ErrorBackoff {
        &self.inner.backoff
    }

    /// False if consecutive errors exceed threshold or no success for too long
    pub fn is_healthy(&self) -> bool {
        let errors = self.inner.backoff.consecutive_errors();
        if errors >= UNHEALTHY_ERROR_THRESHOLD {
            return false;
        }
        !(errors > 0 && self.inner.backoff.time_since_success() > STALE_SUCCESS_LIMIT)
    }

    pub fn status(&self) -> ConsumerStatus {
        ConsumerStatus {
            is_running: self.is_running(),
            messages_processed: self.messages_processed(),
            start_time: self.inner.start_time,
        }
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            status: self.status(),
            consecutive_errors: self.inner.backoff.consecutive_errors(),
            healthy: self.is_healthy(),
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been requested. Never resolves if every
/// sender is gone.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run the startup sequence under `policy`, giving up early on shutdown.
///
/// Exhaustion surfaces as [`ConsumerError::StartupExhausted`] carrying the
/// last attempt's error.
pub async fn start_with_retry<S, F, Fut>(
    policy: &RetryConfig,
    shutdown: &mut watch::Receiver<bool>,
    connect: F,
) -> Result<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    tokio::select! {
        result = with_retry(policy, "consumer_startup", connect) => {
            result.map_err(|e| {
                let attempts = e.attempts();
                ConsumerError::StartupExhausted {
                    attempts,
                    last_error: Box::new(e.into_last_error()),
                }
            })
        }
        _ = shutdown_requested(shutdown) => Err(ConsumerError::Interrupted),
    }
}

/// The consume loop bound to one message source
pub struct ConsumerService<S> {
    source: S,
    processor: MessageProcessor,
    status: StatusTracker,
    metrics: ConsumerMetrics,
}

impl<S: MessageSource> ConsumerService<S> {
    pub fn new(
        source: S,
        processor: MessageProcessor,
        status: StatusTracker,
        metrics: ConsumerMetrics,
    ) -> Self {
        Self {
            source,
            processor,
            status,
            metrics,
        }
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consume until shutdown is requested or the source is exhausted.
    ///
    /// Only the receive is raced against shutdown; once a message is in hand
    /// it is processed and acked before the flag is checked again.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.status.set_running(true);
        self.metrics.consumer_running.set(1);
        info!("Ready to process database change events");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                next = self.source.next_message() => next,
            };

            match next {
                None => {
                    info!("Message source exhausted");
                    break;
                }
                Some(Ok(message)) => {
                    self.record_receive_success();

                    let outcome = self.processor.process(message.payload.as_deref()).await;
                    debug!(
                        partition = message.partition,
                        offset = message.offset,
                        ?outcome,
                        "Message handled"
                    );

                    if let Err(e) = self.source.ack(&message).await {
                        warn!(
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Failed to store offset"
                        );
                    }
                    self.status.record_message();
                }
                Some(Err(e)) => {
                    let backoff = self.record_receive_error(&e);
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        self.status.set_running(false);
        self.metrics.consumer_running.set(0);
        info!("Consume loop stopped");
    }

    /// Commit handled offsets and leave the group
    pub async fn disconnect(&self) {
        self.status.set_running(false);
        self.metrics.consumer_running.set(0);

        match self.source.close().await {
            Ok(()) => info!("Consumer disconnected"),
            Err(e) => error!(error = %e, "Error disconnecting consumer"),
        }
        info!(
            total = self.status.messages_processed(),
            "Total messages processed: {}",
            self.status.messages_processed()
        );
    }

    fn record_receive_success(&self) {
        self.status.backoff().record_success();
        self.metrics.consecutive_errors.set(0);
        self.metrics.consumer_healthy.set(1);
        self.metrics.backoff_seconds.set(0);
    }

    fn record_receive_error(&self, e: &ConsumerError) -> Duration {
        let backoff_state = self.status.backoff();
        let consecutive = backoff_state.record_error();
        self.metrics.consumer_errors_total.inc();
        self.metrics.consecutive_errors.set(consecutive as i64);

        let backoff = backoff_state.current_backoff();
        self.metrics.backoff_seconds.set(backoff.as_secs() as i64);
        self.metrics
            .consumer_healthy
            .set(if self.status.is_healthy() { 1 } else { 0 });

        if consecutive >= CRITICAL_ERROR_THRESHOLD {
            error!(
                consecutive_errors = consecutive,
                backoff_secs = backoff.as_secs(),
                time_since_success_secs = backoff_state.time_since_success().as_secs(),
                "CRITICAL: Kafka consumer experiencing persistent failures. \
                 Manual intervention may be required. Error: {}",
                e
            );
        } else if consecutive >= UNHEALTHY_ERROR_THRESHOLD {
            warn!(
                consecutive_errors = consecutive,
                backoff_secs = backoff.as_secs(),
                "Kafka consumer unhealthy - multiple consecutive errors. Error: {}",
                e
            );
        } else {
            error!(
                consecutive_errors = consecutive,
                backoff_secs = backoff.as_secs(),
                "Kafka consumer error (will retry with backoff): {}",
                e
            );
        }

        backoff
    }
}

/// Run the consume loop until it ends or shutdown is requested, then
/// disconnect.
///
/// On shutdown the in-flight message gets up to `grace` to finish; past that
/// it is abandoned and its offset is not stored, so it is redelivered.
pub async fn supervise<S>(
    service: Arc<ConsumerService<S>>,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) where
    S: MessageSource + 'static,
{
    let worker = Arc::clone(&service);
    let loop_shutdown = shutdown.clone();
    let mut handle = tokio::spawn(async move { worker.run(loop_shutdown).await });

    let mut signal = shutdown;
    tokio::select! {
        joined = &mut handle => {
            if let Err(e) = joined {
                error!(error = %e, "Consume loop task failed");
            }
        }
        _ = shutdown_requested(&mut signal) => {
            info!(grace_secs = grace.as_secs(), "Shutting down, letting in-flight message finish");
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Consume loop task failed"),
                Err(_) => {
                    warn!(
                        grace_secs = grace.as_secs(),
                        "In-flight message did not finish within grace period, abandoning it"
                    );
                    handle.abort();
                }
            }
        }
    }

    service.disconnect().await;
}

/// Resolves on SIGTERM or Ctrl+C
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
