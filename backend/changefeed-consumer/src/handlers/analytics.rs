use change_event::EventEnvelope;
use chrono::Utc;
use idempotent_consumer::IdempotencyGuard;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::AnalyticsMetrics;
use crate::records::{DerivedRecord, RecordKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoAction {
    Create,
    Update,
    Delete,
}

impl TodoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoAction::Create => "create",
            TodoAction::Update => "update",
            TodoAction::Delete => "delete",
        }
    }
}

impl fmt::Display for TodoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary analytics step for todo changes.
///
/// The emitted record is the same on every delivery. Running counters are
/// only advanced the first time an envelope is seen, keyed by
/// [`EventEnvelope::dedup_key`].
#[derive(Clone)]
pub struct TodoAnalytics {
    seen: IdempotencyGuard,
    metrics: AnalyticsMetrics,
}

impl TodoAnalytics {
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: IdempotencyGuard::new(retention),
            metrics: AnalyticsMetrics::new(),
        }
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.seen
    }

    pub fn metrics(&self) -> &AnalyticsMetrics {
        &self.metrics
    }

    pub fn process(&self, action: TodoAction, envelope: &EventEnvelope) -> DerivedRecord {
        let key = envelope.dedup_key();
        match self.seen.mark_processed(&key) {
            Ok(true) => {
                self.metrics.todo_changes.with_label_values(&[action.as_str()]).inc();
            }
            Ok(false) => {
                debug!(key = %key, "Re-delivered todo change, analytics counters unchanged");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping analytics aggregation");
            }
        }

        DerivedRecord::new(
            RecordKind::AnalyticsProcessing,
            json!({
                "event": "todo_analytics_update",
                "action": action.as_str(),
                "todoId": envelope.field("id"),
                "priority": envelope.field("priority"),
                "status": envelope.field("status"),
                "userId": envelope.field("user_id"),
                "processedAt": Utc::now(),
            }),
        )
    }
}
