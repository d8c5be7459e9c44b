//! Operator alerting for conditions that need human attention
//!
//! The pipeline raises alerts through a narrow trait so deployments can wire
//! webhooks or message buses in without touching pipeline code. The default
//! sink writes structured tracing events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

/// Conditions the pipeline escalates to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// Endpoint rejected our credentials (HTTP 401/403)
    AuthFailure { status: u16 },
    /// An item burned through every retry and went terminal FAILED
    RetriesExhausted { item_id: Uuid, retry_count: u32 },
    /// Pending backlog crossed the saturation threshold
    QueueSaturated { pending: usize, capacity: usize },
}

/// A timestamped alert with a ready-to-display message.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind) -> Self {
        let message = match &kind {
            AlertKind::AuthFailure { status } => {
                format!("delivery endpoint rejected credentials (HTTP {})", status)
            }
            AlertKind::RetriesExhausted { item_id, retry_count } => {
                format!("item {} failed after {} attempts, marked FAILED", item_id, retry_count)
            }
            AlertKind::QueueSaturated { pending, capacity } => {
                format!("offline queue at {}/{} pending", pending, capacity)
            }
        };
        Self {
            kind,
            message,
            raised_at: Utc::now(),
        }
    }
}

/// Where alerts go. Implementations must be cheap — callers raise alerts
/// inline on pipeline and sync paths.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: Alert);
}

/// Default sink: structured tracing events.
///
/// Auth failures and exhausted retries are operator-actionable and log at
/// ERROR; queue saturation is an early warning and logs at WARN.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: Alert) {
        match &alert.kind {
            AlertKind::AuthFailure { status } => {
                error!(status = status, "ALERT: {}", alert.message);
            }
            AlertKind::RetriesExhausted { item_id, retry_count } => {
                error!(item_id = %item_id, retry_count = retry_count, "ALERT: {}", alert.message);
            }
            AlertKind::QueueSaturated { pending, capacity } => {
                warn!(pending = pending, capacity = capacity, "ALERT: {}", alert.message);
            }
        }
    }
}
