//! Offline queue item and its sync lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StandardFeature;

/// Sync lifecycle of a queued feature.
///
/// `PendingSync` is the only state the sync worker acts on. `Synced` and
/// `Failed` are terminal — rows stay on disk for audit until retention
/// pruning removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    PendingSync,
    Synced,
    Failed,
}

impl SyncStatus {
    /// True for states the sync worker will never touch again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Synced | SyncStatus::Failed)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::PendingSync => write!(f, "PENDING_SYNC"),
            SyncStatus::Synced => write!(f, "SYNCED"),
            SyncStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A feature parked in the offline queue awaiting delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue-assigned UUID, doubles as the delivery idempotency key
    pub id: Uuid,
    /// The standardized feature to deliver
    pub feature: StandardFeature,
    pub status: SyncStatus,
    /// Completed sync-worker delivery attempts
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the most recent delivery attempt
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set while a sync worker holds this item; stale claims are released on
    /// startup after a crash
    pub claimed_at: Option<DateTime<Utc>>,
    /// Last delivery error, kept for diagnostics
    pub error_message: Option<String>,
}

impl QueueItem {
    /// Wrap a feature for queueing: PENDING_SYNC, zero retries, unclaimed.
    pub fn new(feature: StandardFeature) -> Self {
        Self {
            id: Uuid::new_v4(),
            feature,
            status: SyncStatus::PendingSync,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            claimed_at: None,
            error_message: None,
        }
    }

    /// Wrap a feature under a caller-supplied correlation ID, so audit rows
    /// written before enqueue line up with the queued item.
    pub fn with_id(id: Uuid, feature: StandardFeature) -> Self {
        Self {
            id,
            ..Self::new(feature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccuracyFlag, FeatureProperties, PointGeometry, RawConfidence};

    fn make_feature() -> StandardFeature {
        StandardFeature::new(
            PointGeometry::from_lat_lon(34.05, -118.24),
            FeatureProperties {
                source_id: "cam-1".to_string(),
                object_class: "vehicle".to_string(),
                confidence_normalized: 0.92,
                confidence_original: RawConfidence::numeric(92.0, "0-100"),
                accuracy_meters: 45.0,
                accuracy_flag: AccuracyFlag::Green,
                requires_manual_review: false,
                detected_at: Utc::now(),
                received_at: Utc::now(),
                metadata: serde_json::Map::new(),
            },
        )
    }

    #[test]
    fn test_new_item_starts_pending() {
        let item = QueueItem::new(make_feature());
        assert_eq!(item.status, SyncStatus::PendingSync);
        assert_eq!(item.retry_count, 0);
        assert!(item.last_attempt_at.is_none());
        assert!(item.claimed_at.is_none());
        assert!(item.error_message.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SyncStatus::PendingSync.is_terminal());
        assert!(SyncStatus::Synced.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", SyncStatus::PendingSync), "PENDING_SYNC");
        assert_eq!(format!("{}", SyncStatus::Failed), "FAILED");
    }
}
