//! Offline Queue & Sync Recovery Tests
//!
//! Exercises store-and-forward behavior end to end: endpoint outage during
//! ingest, background sync recovery with retry backoff, retry exhaustion,
//! and redelivery of persisted items across a process restart (fresh sled
//! handles over the same directory).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tacfeed::alerts::{Alert, AlertKind, AlertSink};
use tacfeed::audit::{AuditSink, AuditStage, AuditTrail};
use tacfeed::config::{QueueConfig, SyncConfig, ValidationConfig};
use tacfeed::delivery::{Deliverer, DeliveryOutcome, TacticalSink};
use tacfeed::offline::{MemoryQueueStorage, OfflineQueue, QueueStorage, SledQueueStorage, SyncWorker};
use tacfeed::pipeline::{Pipeline, PipelineOutcome};
use tacfeed::validator::Validator;
use tacfeed::{
    AccuracyFlag, FeatureProperties, PointGeometry, QueueItem, RawConfidence, RawDetection,
    StandardFeature,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Fails the first `failures` pushes with a transient error, then delivers.
struct FlakySink {
    failures: usize,
    pushes: AtomicUsize,
    seen_ids: Mutex<Vec<Uuid>>,
}

impl FlakySink {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            pushes: AtomicUsize::new(0),
            seen_ids: Mutex::new(Vec::new()),
        }
    }

    fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TacticalSink for FlakySink {
    async fn push(&self, item: &QueueItem) -> DeliveryOutcome {
        let n = self.pushes.fetch_add(1, Ordering::SeqCst);
        self.seen_ids.lock().unwrap().push(item.id);
        if n < self.failures {
            DeliveryOutcome::TransientFailure("connect refused".to_string())
        } else {
            DeliveryOutcome::Delivered
        }
    }

    fn destination(&self) -> String {
        "flaky".to_string()
    }
}

#[derive(Default)]
struct CollectingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlerts {
    fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.lock().unwrap().iter().map(|a| a.kind.clone()).collect()
    }
}

impl AlertSink for CollectingAlerts {
    fn raise(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

fn make_detection() -> RawDetection {
    RawDetection {
        source_id: "sensor-3".to_string(),
        object_class: "person".to_string(),
        latitude: 51.5007,
        longitude: -0.1246,
        confidence: RawConfidence::numeric(0.91, "0-1"),
        accuracy_meters: 25.0,
        detected_at: Utc::now(),
        received_at: Utc::now(),
        metadata: serde_json::Map::new(),
    }
}

fn make_feature() -> StandardFeature {
    StandardFeature::new(
        PointGeometry::from_lat_lon(51.5, -0.12),
        FeatureProperties {
            source_id: "sensor-3".to_string(),
            object_class: "person".to_string(),
            confidence_normalized: 0.9,
            confidence_original: RawConfidence::numeric(0.9, "0-1"),
            accuracy_meters: 25.0,
            accuracy_flag: AccuracyFlag::Green,
            requires_manual_review: false,
            detected_at: Utc::now(),
            received_at: Utc::now(),
            metadata: serde_json::Map::new(),
        },
    )
}

fn fast_queue_config(max_retries: u32) -> QueueConfig {
    QueueConfig {
        max_retries,
        backoff_base_ms: 1,
        ..QueueConfig::default()
    }
}

/// Worker cadence for tests: the interval never fires on its own, so passes
/// run only when items come due or a nudge lands.
fn test_sync_config() -> SyncConfig {
    SyncConfig {
        interval_secs: 3600,
        batch_limit: 10,
        jitter_secs: 0,
    }
}

/// Poll until `check` passes or five seconds elapse.
async fn wait_until<F: Fn() -> bool>(check: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Outage → Recovery
// ============================================================================

/// Endpoint down at ingest, back up two attempts later: the feature must
/// arrive via background sync with the full audit journey recorded.
#[tokio::test]
async fn queued_feature_recovers_when_endpoint_returns() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    let audit = Arc::new(AuditTrail::open(&db).unwrap());
    let storage: Arc<dyn QueueStorage> = Arc::new(SledQueueStorage::open(&db).unwrap());
    let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(5)).unwrap());

    let sink = Arc::new(FlakySink::new(2));
    let deliverer = Deliverer::new(sink.clone(), Duration::from_secs(1));
    let alerts = Arc::new(CollectingAlerts::default());

    let worker = SyncWorker::new(
        Arc::clone(&queue),
        deliverer.clone(),
        alerts.clone(),
        Some(Arc::clone(&audit) as Arc<dyn AuditSink>),
        test_sync_config(),
    );
    let pipeline = Pipeline::new(
        Validator::new(ValidationConfig::default()),
        Arc::clone(&queue),
        deliverer,
        alerts.clone(),
    )
    .with_audit(Arc::clone(&audit) as Arc<dyn AuditSink>)
    .with_sync_handle(worker.handle());

    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    // in-line attempt fails, feature parks
    let outcome = pipeline.process(make_detection()).await.unwrap();
    let PipelineOutcome::Queued { item_id } = outcome else {
        panic!("expected Queued, got {:?}", outcome);
    };

    wait_until(|| queue.pending_count() == 0, "background sync to deliver").await;
    cancel.cancel();
    worker_task.await.unwrap();

    // one in-line push plus two worker attempts
    assert_eq!(sink.push_count(), 3);
    // every attempt pushed the same item — the correlation id survives retries
    assert!(sink.seen_ids.lock().unwrap().iter().all(|id| *id == item_id));

    let stages: Vec<AuditStage> = audit
        .for_item(item_id)
        .unwrap()
        .iter()
        .map(|r| r.stage)
        .collect();
    assert_eq!(
        stages,
        vec![
            AuditStage::Received,
            AuditStage::Validated,
            AuditStage::Translated,
            AuditStage::Queued,
            AuditStage::SyncSuccess,
        ]
    );

    // recovery is not an incident
    assert!(alerts.kinds().is_empty(), "clean recovery must not alert");
}

// ============================================================================
// Retry Exhaustion
// ============================================================================

/// A permanently dead endpoint burns through the retry budget; the item goes
/// FAILED, stays on disk for audit, and operators get exactly one alert.
#[tokio::test]
async fn dead_endpoint_exhausts_retries_and_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    let audit = Arc::new(AuditTrail::open(&db).unwrap());
    let storage: Arc<dyn QueueStorage> = Arc::new(SledQueueStorage::open(&db).unwrap());
    let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(2)).unwrap());

    let sink = Arc::new(FlakySink::new(usize::MAX)); // never recovers
    let deliverer = Deliverer::new(sink.clone(), Duration::from_secs(1));
    let alerts = Arc::new(CollectingAlerts::default());

    let worker = SyncWorker::new(
        Arc::clone(&queue),
        deliverer.clone(),
        alerts.clone(),
        Some(Arc::clone(&audit) as Arc<dyn AuditSink>),
        test_sync_config(),
    );
    let pipeline = Pipeline::new(
        Validator::new(ValidationConfig::default()),
        Arc::clone(&queue),
        deliverer,
        alerts.clone(),
    )
    .with_audit(Arc::clone(&audit) as Arc<dyn AuditSink>)
    .with_sync_handle(worker.handle());

    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let outcome = pipeline.process(make_detection()).await.unwrap();
    let PipelineOutcome::Queued { item_id } = outcome else {
        panic!("expected Queued, got {:?}", outcome);
    };

    let stats_failed = {
        let queue = Arc::clone(&queue);
        move || queue.stats().map(|s| s.failed == 1).unwrap_or(false)
    };
    wait_until(stats_failed, "item to exhaust its retries").await;
    cancel.cancel();
    worker_task.await.unwrap();

    // in-line attempt + max_retries worker attempts
    assert_eq!(sink.push_count(), 3);

    let exhausted: Vec<_> = alerts
        .kinds()
        .into_iter()
        .filter(|k| matches!(k, AlertKind::RetriesExhausted { .. }))
        .collect();
    assert_eq!(exhausted.len(), 1);
    match &exhausted[0] {
        AlertKind::RetriesExhausted {
            item_id: alerted,
            retry_count,
        } => {
            assert_eq!(*alerted, item_id);
            assert_eq!(*retry_count, 2);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    let records = audit.for_item(item_id).unwrap();
    assert_eq!(
        records.last().map(|r| r.stage),
        Some(AuditStage::SyncExhausted)
    );
}

// ============================================================================
// Claim Exclusivity
// ============================================================================

/// Many passes racing over one PENDING_SYNC item: exactly one claims it, so
/// the same item can never be in delivery twice at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_passes_claim_an_item_exactly_once() {
    let storage: Arc<dyn QueueStorage> = Arc::new(MemoryQueueStorage::new());
    let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(5)).unwrap());
    queue.enqueue(&QueueItem::new(make_feature())).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        tasks.push(tokio::spawn(async move { queue.take_due(10).unwrap().len() }));
    }

    let mut claimed_total = 0;
    for task in tasks {
        claimed_total += task.await.unwrap();
    }
    assert_eq!(claimed_total, 1, "only one racing pass may claim the item");
}

// ============================================================================
// Restart Recovery
// ============================================================================

/// Queued features survive a process restart: a fresh queue over the same
/// directory recovers them and the worker delivers with the original ids.
#[tokio::test]
async fn queued_features_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db");

    // --- first life: endpoint down, two features park ---
    let mut parked_ids = {
        let db = sled::open(&db_path).unwrap();
        let storage: Arc<dyn QueueStorage> = Arc::new(SledQueueStorage::open(&db).unwrap());
        let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(5)).unwrap());

        let sink = Arc::new(FlakySink::new(usize::MAX));
        let pipeline = Pipeline::new(
            Validator::new(ValidationConfig::default()),
            Arc::clone(&queue),
            Deliverer::new(sink, Duration::from_secs(1)),
            Arc::new(CollectingAlerts::default()),
        );

        let mut ids = Vec::new();
        for _ in 0..2 {
            match pipeline.process(make_detection()).await.unwrap() {
                PipelineOutcome::Queued { item_id } => ids.push(item_id),
                other => panic!("expected Queued, got {:?}", other),
            }
        }
        assert_eq!(queue.pending_count(), 2);
        ids
        // db, storage, queue all drop here — the "crash"
    };

    // --- second life: endpoint healthy, fresh handles over the same data ---
    let db = sled::open(&db_path).unwrap();
    let storage: Arc<dyn QueueStorage> = Arc::new(SledQueueStorage::open(&db).unwrap());
    let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(5)).unwrap());
    assert_eq!(queue.pending_count(), 2, "restart must recover parked features");

    let sink = Arc::new(FlakySink::new(0));
    let worker = SyncWorker::new(
        Arc::clone(&queue),
        Deliverer::new(sink.clone(), Duration::from_secs(1)),
        Arc::new(CollectingAlerts::default()),
        None,
        test_sync_config(),
    );

    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    wait_until(|| queue.pending_count() == 0, "restarted worker to drain the queue").await;
    cancel.cancel();
    worker_task.await.unwrap();

    let mut delivered_ids = sink.seen_ids.lock().unwrap().clone();
    delivered_ids.sort();
    parked_ids.sort();
    assert_eq!(delivered_ids, parked_ids, "redelivery must reuse the persisted ids");

    let stats = queue.stats().unwrap();
    assert_eq!(stats.synced, 2);
    assert_eq!(stats.failed, 0);
}

/// A claim left behind by a crash mid-delivery is stale on reopen and the
/// item flows again instead of being stuck in limbo.
#[tokio::test]
async fn stale_claim_from_crash_is_redelivered() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db");

    let item_id = {
        let db = sled::open(&db_path).unwrap();
        let storage = SledQueueStorage::open(&db).unwrap();

        // what disk looks like when the process died mid-attempt: claimed
        // long ago, never resolved
        let mut item = QueueItem::new(make_feature());
        item.claimed_at = Some(Utc::now() - ChronoDuration::seconds(600));
        storage.put(&item).unwrap();
        item.id
    };

    let db = sled::open(&db_path).unwrap();
    let storage: Arc<dyn QueueStorage> = Arc::new(SledQueueStorage::open(&db).unwrap());
    let queue = Arc::new(OfflineQueue::open(storage, &fast_queue_config(5)).unwrap());
    assert_eq!(queue.pending_count(), 1);

    let sink = Arc::new(FlakySink::new(0));
    let worker = SyncWorker::new(
        Arc::clone(&queue),
        Deliverer::new(sink.clone(), Duration::from_secs(1)),
        Arc::new(CollectingAlerts::default()),
        None,
        test_sync_config(),
    );

    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    wait_until(|| queue.stats().map(|s| s.synced == 1).unwrap_or(false), "stale item to deliver").await;
    cancel.cancel();
    worker_task.await.unwrap();

    assert_eq!(sink.seen_ids.lock().unwrap().as_slice(), &[item_id]);
}
