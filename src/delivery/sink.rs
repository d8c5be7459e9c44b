//! Delivery seam: the `TacticalSink` trait and the timeout-enforcing wrapper

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::QueueItem;

/// Result of one delivery attempt.
///
/// Deliberately not a `Result` — the retry machinery needs to distinguish
/// transient trouble from credential rejection, and both are ordinary
/// outcomes rather than bugs.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Endpoint acknowledged the feature (2xx)
    Delivered,
    /// Worth retrying: connect failure, timeout, 5xx, other transport trouble
    TransientFailure(String),
    /// Endpoint rejected credentials (401/403) — retrying won't help until an
    /// operator fixes the credential
    AuthFailure { status: u16 },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// A destination that accepts standardized features.
#[async_trait]
pub trait TacticalSink: Send + Sync {
    /// Push one queued feature. Implementations must tolerate the same item
    /// arriving twice — `item.id` is the idempotency key and at-least-once
    /// delivery will redeliver after ambiguous failures.
    async fn push(&self, item: &QueueItem) -> DeliveryOutcome;

    /// Human-readable destination label for logs.
    fn destination(&self) -> String;
}

/// Wraps a sink with the per-push timeout so no delivery attempt can wedge
/// the pipeline or a sync pass.
#[derive(Clone)]
pub struct Deliverer {
    sink: Arc<dyn TacticalSink>,
    timeout: Duration,
}

impl Deliverer {
    pub fn new(sink: Arc<dyn TacticalSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// One bounded delivery attempt.
    pub async fn deliver(&self, item: &QueueItem) -> DeliveryOutcome {
        match tokio::time::timeout(self.timeout, self.sink.push(item)).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::TransientFailure(format!(
                "delivery timed out after {:?}",
                self.timeout
            )),
        }
    }

    pub fn destination(&self) -> String {
        self.sink.destination()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AccuracyFlag, FeatureProperties, PointGeometry, RawConfidence, StandardFeature,
    };
    use chrono::Utc;

    fn make_item() -> QueueItem {
        QueueItem::new(StandardFeature::new(
            PointGeometry::from_lat_lon(1.0, 2.0),
            FeatureProperties {
                source_id: "cam-1".to_string(),
                object_class: "person".to_string(),
                confidence_normalized: 0.8,
                confidence_original: RawConfidence::numeric(0.8, "0-1"),
                accuracy_meters: 30.0,
                accuracy_flag: AccuracyFlag::Green,
                requires_manual_review: false,
                detected_at: Utc::now(),
                received_at: Utc::now(),
                metadata: serde_json::Map::new(),
            },
        ))
    }

    struct InstantSink;

    #[async_trait]
    impl TacticalSink for InstantSink {
        async fn push(&self, _item: &QueueItem) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }

        fn destination(&self) -> String {
            "instant".to_string()
        }
    }

    struct StuckSink;

    #[async_trait]
    impl TacticalSink for StuckSink {
        async fn push(&self, _item: &QueueItem) -> DeliveryOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            DeliveryOutcome::Delivered
        }

        fn destination(&self) -> String {
            "stuck".to_string()
        }
    }

    #[tokio::test]
    async fn test_deliverer_passes_through_success() {
        let deliverer = Deliverer::new(Arc::new(InstantSink), Duration::from_secs(5));
        let outcome = deliverer.deliver(&make_item()).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_deliverer_times_out_stuck_sink() {
        let deliverer = Deliverer::new(Arc::new(StuckSink), Duration::from_millis(20));
        let outcome = deliverer.deliver(&make_item()).await;
        match outcome {
            DeliveryOutcome::TransientFailure(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
