//! Pipeline orchestrator — one detection in, one durable outcome out
//!
//! Sequencing is the whole point of this module: a feature is parked in the
//! offline queue BEFORE the in-line delivery attempt, so the worst a crash or
//! endpoint outage can do is deliver twice. Rejections are terminal and
//! audited; backpressure surfaces as an error the caller must not ack past.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{Alert, AlertKind, AlertSink};
use crate::audit::{AuditRecord, AuditSink, AuditStage};
use crate::config::defaults;
use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::offline::{OfflineQueue, QueueError, SyncHandle};
use crate::translator;
use crate::types::{QueueItem, RawDetection};
use crate::validator::Validator;

use super::source::{DetectionSource, SourceEvent};

/// Where a detection ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Endpoint acknowledged the feature on the in-line attempt
    Delivered { item_id: Uuid },
    /// Endpoint unavailable — feature parked for the sync worker
    Queued { item_id: Uuid },
    /// Input could not be interpreted; nothing was queued
    Rejected { reason: String },
}

/// Failures the caller must not ack past.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Queue at capacity — backpressure, retry later or shed load
    #[error("queue full: {pending}/{capacity} pending")]
    QueueFull { pending: usize, capacity: usize },

    /// Storage failed — the feature is NOT parked
    #[error("queue storage failure: {0}")]
    Storage(String),
}

impl From<QueueError> for PipelineError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Full { pending, capacity } => Self::QueueFull { pending, capacity },
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Lifetime counters for the running gateway.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PipelineStats {
    pub received: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub queued: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} rejected={} delivered={} queued={}",
            self.received, self.rejected, self.delivered, self.queued
        )
    }
}

/// The validate → translate → persist → deliver pipeline.
pub struct Pipeline {
    validator: Validator,
    queue: Arc<OfflineQueue>,
    deliverer: Deliverer,
    alerts: Arc<dyn AlertSink>,
    audit: Option<Arc<dyn AuditSink>>,
    sync_handle: Option<SyncHandle>,
    stats: Mutex<PipelineStats>,
    saturation_warn_ratio: f64,
    saturation_alerted: AtomicBool,
    /// Set while in-line deliveries are failing; cleared (with a worker
    /// nudge) on the first success after
    endpoint_degraded: AtomicBool,
}

impl Pipeline {
    pub fn new(
        validator: Validator,
        queue: Arc<OfflineQueue>,
        deliverer: Deliverer,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            validator,
            queue,
            deliverer,
            alerts,
            audit: None,
            sync_handle: None,
            stats: Mutex::new(PipelineStats::default()),
            saturation_warn_ratio: defaults::QUEUE_SATURATION_WARN_RATIO,
            saturation_alerted: AtomicBool::new(false),
            endpoint_degraded: AtomicBool::new(false),
        }
    }

    /// Attach the audit trail.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Attach the sync worker's nudge handle so queueing and recovery wake it.
    #[must_use]
    pub fn with_sync_handle(mut self, handle: SyncHandle) -> Self {
        self.sync_handle = Some(handle);
        self
    }

    /// Run one raw detection through the full pipeline.
    ///
    /// `Ok(Rejected)` means the input was uninterpretable — recorded, not
    /// queued, and safe to ack. `Err` means the feature is NOT parked and the
    /// caller must not ack its source.
    pub async fn process(
        &self,
        detection: RawDetection,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = std::time::Instant::now();
        let item_id = Uuid::new_v4();
        let source_id = detection.source_id.clone();

        self.bump(|s| s.received += 1);
        self.audit_stage(item_id, &source_id, AuditStage::Received, None);

        // ---- validate ----
        let validated = match self.validator.validate(detection) {
            Ok(v) => v,
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "Detection rejected by validation");
                self.bump(|s| s.rejected += 1);
                return Ok(PipelineOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };
        self.audit_stage(
            item_id,
            &source_id,
            AuditStage::Validated,
            Some(&format!(
                "flag={} confidence={:.2}",
                validated.accuracy_flag, validated.confidence_normalized
            )),
        );

        // ---- translate ----
        let feature = match translator::translate(validated) {
            Ok(f) => f,
            Err(e) => {
                // validated input failing translation is a bug, not bad input
                error!(source_id = %source_id, error = %e, "Detection rejected by translation");
                self.bump(|s| s.rejected += 1);
                return Ok(PipelineOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };
        self.audit_stage(item_id, &source_id, AuditStage::Translated, None);

        // ---- persist, write-ahead ----
        // Pre-claimed: the in-line attempt below owns the item, so a sync
        // pass starting now cannot double-deliver it.
        let mut item = QueueItem::with_id(item_id, feature);
        item.claimed_at = Some(Utc::now());
        self.queue.enqueue(&item)?;
        self.check_saturation();

        // ---- in-line delivery ----
        match self.deliverer.deliver(&item).await {
            DeliveryOutcome::Delivered => {
                if let Err(e) = self.queue.mark_synced(item_id) {
                    // already delivered; the stale row will redeliver, which
                    // at-least-once tolerates
                    warn!(id = %item_id, error = %e, "Delivered but could not mark synced");
                }
                self.bump(|s| s.delivered += 1);
                self.audit_stage(item_id, &source_id, AuditStage::Delivered, None);

                if self.endpoint_degraded.swap(false, Ordering::SeqCst) {
                    info!("Endpoint reachable again, nudging sync worker");
                    if let Some(handle) = &self.sync_handle {
                        handle.nudge();
                    }
                }

                let elapsed = started.elapsed().as_millis();
                if elapsed > defaults::PROCESS_TARGET_MS {
                    warn!(elapsed_ms = elapsed, "Detection processing exceeded latency target");
                }
                debug!(id = %item_id, elapsed_ms = elapsed, "Detection delivered in-line");
                Ok(PipelineOutcome::Delivered { item_id })
            }
            DeliveryOutcome::AuthFailure { status } => {
                let first_failure = !self.endpoint_degraded.swap(true, Ordering::SeqCst);
                if first_failure {
                    self.alerts.raise(Alert::new(AlertKind::AuthFailure { status }));
                }
                let msg = format!("auth rejected (HTTP {})", status);
                self.park_after_failure(item_id, &source_id, &msg);
                Ok(PipelineOutcome::Queued { item_id })
            }
            DeliveryOutcome::TransientFailure(msg) => {
                self.endpoint_degraded.store(true, Ordering::SeqCst);
                self.park_after_failure(item_id, &source_id, &msg);
                Ok(PipelineOutcome::Queued { item_id })
            }
        }
    }

    /// Drive a detection source until EOF or cancellation.
    pub async fn run_ingest<S: DetectionSource>(
        &self,
        mut source: S,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(source = source.source_name(), "Ingest started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(stats = %self.stats(), "Ingest stopping");
                    break;
                }
                event = source.next_detection() => {
                    match event? {
                        SourceEvent::Detection(detection) => {
                            match self.process(detection).await {
                                Ok(_) => {}
                                Err(PipelineError::QueueFull { pending, capacity }) => {
                                    warn!(
                                        pending = pending,
                                        capacity = capacity,
                                        "Backpressure: detection dropped, queue full"
                                    );
                                }
                                Err(e) => {
                                    error!(error = %e, "Pipeline storage failure, stopping ingest");
                                    return Err(e.into());
                                }
                            }
                        }
                        SourceEvent::Eof => {
                            info!(stats = %self.stats(), "Source EOF, ingest complete");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Common tail for both in-line failure kinds: release the enqueue-time
    /// claim, stamp the attempt, wake the worker to schedule the retry.
    fn park_after_failure(&self, item_id: Uuid, source_id: &str, msg: &str) {
        if let Err(e) = self.queue.record_initial_failure(item_id, msg) {
            // claim stays until the staleness window releases it
            warn!(id = %item_id, error = %e, "Could not record in-line failure");
        }
        self.bump(|s| s.queued += 1);
        self.audit_stage(item_id, source_id, AuditStage::Queued, Some(msg));
        if let Some(handle) = &self.sync_handle {
            handle.nudge();
        }
        debug!(id = %item_id, error = msg, "Endpoint unavailable, feature queued");
    }

    fn check_saturation(&self) {
        let pending = self.queue.pending_count();
        let capacity = self.queue.capacity();
        let threshold = (capacity as f64 * self.saturation_warn_ratio) as usize;
        if pending >= threshold {
            if !self.saturation_alerted.swap(true, Ordering::SeqCst) {
                self.alerts.raise(Alert::new(AlertKind::QueueSaturated { pending, capacity }));
            }
        } else {
            self.saturation_alerted.store(false, Ordering::SeqCst);
        }
    }

    fn bump(&self, f: impl FnOnce(&mut PipelineStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    fn audit_stage(&self, item_id: Uuid, source_id: &str, stage: AuditStage, detail: Option<&str>) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(AuditRecord::new(item_id, source_id, stage, detail)) {
                warn!(error = %e, "Audit write failed");
            }
        }
    }
}
