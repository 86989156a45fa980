//! # Idempotent Consumer Library
//!
//! Tracks which events a consumer has already applied so that at-least-once
//! delivery from Kafka never double-applies a side effect.
//!
//! ## Problem
//!
//! The broker redelivers on rebalance, on consumer restart before an offset
//! commit, and on producer retries. A handler that maintains running
//! aggregates (counters, totals) would count the same change twice.
//!
//! ## Solution
//!
//! - **Atomic claim**: the first caller to claim an event id wins; concurrent
//!   callers see `AlreadyProcessed`
//! - **Release on failure**: a failed processing function gives the claim
//!   back so a later redelivery can try again
//! - **Configurable retention**: processed ids are kept for a window and
//!   removed by `cleanup_old_events`
//!
//! ```text
//! Kafka → Consumer → IdempotencyGuard → Aggregate update
//!                         ↓
//!                  (claim / release)
//!                         ↓
//!                 processed-id map (per process)
//! ```
//!
//! Tracking lives in process memory: it covers redelivery within one
//! consumer lifetime, which is where rebalances and retries happen.
//!
//! ## Usage Example
//!
//! ```rust
//! use idempotent_consumer::{IdempotencyGuard, ProcessingResult};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let guard = IdempotencyGuard::new(Duration::from_secs(86400));
//!
//! match guard.process_if_new("todos:INSERT:42", || async {
//!     // Aggregate update here
//!     Ok(())
//! }).await? {
//!     ProcessingResult::Success => println!("Applied"),
//!     ProcessingResult::AlreadyProcessed => println!("Skipped duplicate"),
//!     ProcessingResult::Failed(err) => eprintln!("Failed: {}", err),
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod error;

pub use error::{IdempotencyError, IdempotencyResult};

/// Maximum accepted event id length
const MAX_EVENT_ID_LEN: usize = 255;

/// Result of processing an event with idempotency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Event was processed successfully (first time)
    Success,

    /// Event was already processed before (duplicate)
    AlreadyProcessed,

    /// Event processing failed with error message
    Failed(String),
}

impl ProcessingResult {
    /// Check if processing was successful (either first time or already processed)
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ProcessingResult::Success | ProcessingResult::AlreadyProcessed
        )
    }

    /// Check if processing failed
    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingResult::Failed(_))
    }
}

/// A processed event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    /// Unique event identifier
    pub event_id: String,

    /// When the event was claimed
    pub processed_at: DateTime<Utc>,
}

/// Idempotency guard for event processing
///
/// Cheap to clone; clones share the same processed-id map.
#[derive(Clone)]
pub struct IdempotencyGuard {
    processed: Arc<DashMap<String, ProcessedEvent>>,
    retention_duration: Duration,
}

impl IdempotencyGuard {
    /// Create a new idempotency guard
    ///
    /// # Arguments
    ///
    /// * `retention_duration` - How long to keep processed event IDs
    pub fn new(retention_duration: Duration) -> Self {
        Self {
            processed: Arc::new(DashMap::new()),
            retention_duration,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention_duration
    }

    /// Number of tracked event ids
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Check if an event has already been processed
    pub fn is_processed(&self, event_id: &str) -> IdempotencyResult<bool> {
        Self::validate_event_id(event_id)?;

        let exists = self.processed.contains_key(event_id);
        if exists {
            debug!(event_id = %event_id, "Event already processed");
        }

        Ok(exists)
    }

    /// Mark an event as processed
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if event was marked as processed (first time)
    /// - `Ok(false)` if event was already processed (duplicate)
    pub fn mark_processed(&self, event_id: &str) -> IdempotencyResult<bool> {
        Self::validate_event_id(event_id)?;

        let was_inserted = match self.processed.entry(event_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ProcessedEvent {
                    event_id: event_id.to_string(),
                    processed_at: Utc::now(),
                });
                true
            }
        };

        if was_inserted {
            debug!(event_id = %event_id, "Event marked as processed");
        } else {
            debug!(
                event_id = %event_id,
                "Event already marked as processed (duplicate)"
            );
        }

        Ok(was_inserted)
    }

    /// Forget an event so a later delivery is processed again
    pub fn release(&self, event_id: &str) -> bool {
        self.processed.remove(event_id).is_some()
    }

    /// Process event only if it hasn't been processed before
    ///
    /// The event id is claimed before `f` runs, so concurrent callers for the
    /// same id never both execute `f`. If `f` fails the claim is released.
    pub async fn process_if_new<F, Fut>(
        &self,
        event_id: &str,
        f: F,
    ) -> IdempotencyResult<ProcessingResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), anyhow::Error>>,
    {
        if !self.mark_processed(event_id)? {
            return Ok(ProcessingResult::AlreadyProcessed);
        }

        match f().await {
            Ok(()) => Ok(ProcessingResult::Success),
            Err(e) => {
                self.release(event_id);
                warn!(
                    event_id = %event_id,
                    error = ?e,
                    "Event processing failed, claim released"
                );
                Ok(ProcessingResult::Failed(e.to_string()))
            }
        }
    }

    /// Delete processed ids older than the retention window
    ///
    /// # Returns
    ///
    /// Number of ids removed
    pub fn cleanup_old_events(&self) -> IdempotencyResult<u64> {
        let retention = chrono::Duration::from_std(self.retention_duration).map_err(|e| {
            IdempotencyError::Other(anyhow::anyhow!("Invalid retention duration: {}", e))
        })?;
        let cutoff_time = Utc::now() - retention;

        let before = self.processed.len();
        self.processed
            .retain(|_, event| event.processed_at >= cutoff_time);
        let deleted_count = before.saturating_sub(self.processed.len()) as u64;

        if deleted_count > 0 {
            info!(
                deleted_count = deleted_count,
                cutoff_time = %cutoff_time,
                "Cleaned up old processed events"
            );
        } else {
            debug!("No old events to cleanup");
        }

        Ok(deleted_count)
    }

    /// Run `cleanup_old_events` every `interval` until the task is dropped
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = guard.cleanup_old_events() {
                    warn!(error = %e, "Processed event cleanup failed");
                }
            }
        })
    }

    /// Validate event_id format
    fn validate_event_id(event_id: &str) -> IdempotencyResult<()> {
        if event_id.is_empty() {
            return Err(IdempotencyError::InvalidEventId(
                "Event ID cannot be empty".to_string(),
            ));
        }

        if event_id.len() > MAX_EVENT_ID_LEN {
            return Err(IdempotencyError::InvalidEventId(format!(
                "Event ID too long: {} characters (max {})",
                event_id.len(),
                MAX_EVENT_ID_LEN
            )));
        }

        Ok(())
    }
}
