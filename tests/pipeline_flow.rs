//! Pipeline Flow Tests
//!
//! Exercises the full validate → translate → persist → deliver path with a
//! scripted in-process sink. Asserts on the standardized GeoJSON shape the
//! endpoint actually receives, confidence normalization across source scales,
//! accuracy flagging, and rejection of uninterpretable input.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tacfeed::alerts::{Alert, AlertSink};
use tacfeed::config::{QueueConfig, ValidationConfig};
use tacfeed::delivery::{Deliverer, DeliveryOutcome, TacticalSink};
use tacfeed::offline::{MemoryQueueStorage, OfflineQueue, QueueStorage};
use tacfeed::pipeline::{Pipeline, PipelineOutcome};
use tacfeed::validator::Validator;
use tacfeed::{AccuracyFlag, QueueItem, RawConfidence, RawDetection};

// ============================================================================
// Test Helpers
// ============================================================================

/// Records every push and replays a scripted outcome sequence; once the
/// script runs dry it delivers everything.
struct ScriptedSink {
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    pushes: Mutex<Vec<QueueItem>>,
}

impl ScriptedSink {
    fn new(outcomes: Vec<DeliveryOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    fn delivered_items(&self) -> Vec<QueueItem> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TacticalSink for ScriptedSink {
    async fn push(&self, item: &QueueItem) -> DeliveryOutcome {
        self.pushes.lock().unwrap().push(item.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }

    fn destination(&self) -> String {
        "scripted".to_string()
    }
}

#[derive(Default)]
struct SilentAlerts;

impl AlertSink for SilentAlerts {
    fn raise(&self, _alert: Alert) {}
}

fn make_detection(confidence: RawConfidence) -> RawDetection {
    RawDetection {
        source_id: "uav-12".to_string(),
        object_class: "vehicle".to_string(),
        latitude: 34.0522,
        longitude: -118.2437,
        confidence,
        accuracy_meters: 45.0,
        detected_at: Utc::now(),
        received_at: Utc::now(),
        metadata: serde_json::Map::new(),
    }
}

fn build_pipeline(sink: Arc<ScriptedSink>) -> Pipeline {
    let storage: Arc<dyn QueueStorage> = Arc::new(MemoryQueueStorage::new());
    let queue = Arc::new(OfflineQueue::open(storage, &QueueConfig::default()).unwrap());
    Pipeline::new(
        Validator::new(ValidationConfig::default()),
        queue,
        Deliverer::new(sink, Duration::from_secs(1)),
        Arc::new(SilentAlerts),
    )
}

// ============================================================================
// Standardized Feed Shape
// ============================================================================

/// The endpoint must receive a GeoJSON Feature with [longitude, latitude]
/// coordinate order and the full property set.
#[tokio::test]
async fn delivered_feature_is_valid_geojson() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    let outcome = pipeline
        .process(make_detection(RawConfidence::numeric(87.0, "0-100")))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Delivered { .. }));

    let items = sink.delivered_items();
    assert_eq!(items.len(), 1);

    let json = serde_json::to_value(&items[0].feature).unwrap();
    assert_eq!(json["type"], "Feature");
    assert_eq!(json["geometry"]["type"], "Point");
    // GeoJSON axis order: longitude first
    assert_eq!(json["geometry"]["coordinates"][0], -118.2437);
    assert_eq!(json["geometry"]["coordinates"][1], 34.0522);

    let props = &json["properties"];
    assert_eq!(props["source_id"], "uav-12");
    assert_eq!(props["object_class"], "vehicle");
    assert_eq!(props["confidence_normalized"], 0.87);
    assert_eq!(props["accuracy_flag"], "green");
    assert_eq!(props["requires_manual_review"], false);
    // original confidence kept verbatim for downstream forensics
    assert_eq!(props["confidence_original"]["value"], 87.0);
    assert_eq!(props["confidence_original"]["scale"], "0-100");
}

#[tokio::test]
async fn label_confidence_normalizes_and_keeps_original() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    pipeline
        .process(make_detection(RawConfidence::label("High")))
        .await
        .unwrap();

    let items = sink.delivered_items();
    let props = &items[0].feature.properties;
    assert!((props.confidence_normalized - 0.8).abs() < f64::EPSILON);
    assert_eq!(props.accuracy_flag, AccuracyFlag::Green);

    let original = serde_json::to_value(&props.confidence_original).unwrap();
    assert_eq!(original["value"], "High");
}

#[tokio::test]
async fn fractional_confidence_passes_through_unscaled() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    pipeline
        .process(make_detection(RawConfidence::numeric(0.55, "0-1")))
        .await
        .unwrap();

    let props = &sink.delivered_items()[0].feature.properties;
    assert!((props.confidence_normalized - 0.55).abs() < f64::EPSILON);
    // 0.55 sits between the cutoffs: accurate but not confident enough for GREEN
    assert_eq!(props.accuracy_flag, AccuracyFlag::Yellow);
}

// ============================================================================
// Degraded Input
// ============================================================================

/// Out-of-range coordinates flow through flagged RED for manual review —
/// operators see the detection rather than losing it.
#[tokio::test]
async fn out_of_range_coordinates_flag_red_not_rejected() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    let mut detection = make_detection(RawConfidence::numeric(0.9, "0-1"));
    detection.latitude = 95.0;

    let outcome = pipeline.process(detection).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Delivered { .. }));

    let props = &sink.delivered_items()[0].feature.properties;
    assert_eq!(props.accuracy_flag, AccuracyFlag::Red);
    assert!(props.requires_manual_review);
}

#[tokio::test]
async fn unknown_scale_rejects_without_queueing() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    let outcome = pipeline
        .process(make_detection(RawConfidence::numeric(3.0, "stars")))
        .await
        .unwrap();

    match outcome {
        PipelineOutcome::Rejected { reason } => assert!(reason.contains("stars")),
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert!(sink.delivered_items().is_empty(), "rejected input must never reach the sink");
    assert_eq!(pipeline.stats().rejected, 1);
}

#[tokio::test]
async fn unknown_label_rejects() {
    let sink = Arc::new(ScriptedSink::new(vec![]));
    let pipeline = build_pipeline(sink.clone());

    let outcome = pipeline
        .process(make_detection(RawConfidence::label("probably")))
        .await
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::Rejected { .. }));
    assert!(sink.delivered_items().is_empty());
}

// ============================================================================
// Offline Fallback (in-line half — full recovery lives in offline_sync.rs)
// ============================================================================

#[tokio::test]
async fn endpoint_outage_queues_instead_of_dropping() {
    let sink = Arc::new(ScriptedSink::new(vec![DeliveryOutcome::TransientFailure(
        "connect refused".to_string(),
    )]));
    let pipeline = build_pipeline(sink.clone());

    let outcome = pipeline
        .process(make_detection(RawConfidence::numeric(0.9, "0-1")))
        .await
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::Queued { .. }));
    let stats = pipeline.stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.delivered, 0);
}
