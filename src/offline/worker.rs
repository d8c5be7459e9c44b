//! Background sync worker — drains the offline queue when connectivity allows
//!
//! Loop shape: sleep until the earliest queued item is due (or the fixed
//! interval when idle), claim a batch, attempt delivery, record outcomes.
//! A `SyncHandle` nudge cuts any sleep short — the pipeline uses it when it
//! queues new work or sees connectivity return.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::OfflineQueue;
use crate::alerts::{Alert, AlertKind, AlertSink};
use crate::audit::{AuditRecord, AuditSink, AuditStage};
use crate::config::SyncConfig;
use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::types::{QueueItem, SyncStatus};

/// Consecutive in-pass transport failures before the rest of the batch is
/// released unattempted. When the endpoint is down, one timeout per pass is
/// signal enough; thirty-two of them is just a wedged pass.
const PASS_ABORT_AFTER_FAILURES: usize = 3;

/// Handle for waking the worker outside its timer.
#[derive(Clone)]
pub struct SyncHandle {
    notify: Arc<Notify>,
}

impl SyncHandle {
    /// Cut the worker's current sleep short so it re-examines the queue.
    pub fn nudge(&self) {
        self.notify.notify_one();
    }
}

pub struct SyncWorker {
    queue: Arc<OfflineQueue>,
    deliverer: Deliverer,
    alerts: Arc<dyn AlertSink>,
    audit: Option<Arc<dyn AuditSink>>,
    config: SyncConfig,
    notify: Arc<Notify>,
    /// Failed attempts since the last success, for the connectivity-restored
    /// transition log
    consecutive_failures: u32,
}

impl SyncWorker {
    pub fn new(
        queue: Arc<OfflineQueue>,
        deliverer: Deliverer,
        alerts: Arc<dyn AlertSink>,
        audit: Option<Arc<dyn AuditSink>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            deliverer,
            alerts,
            audit,
            config,
            notify: Arc::new(Notify::new()),
            consecutive_failures: 0,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            notify: Arc::clone(&self.notify),
        }
    }

    /// Run until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            destination = %self.deliverer.destination(),
            "Sync worker started"
        );

        loop {
            let sleep_for = self.next_sleep();
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync worker stopping");
                    break;
                }
                _ = self.notify.notified() => {
                    debug!("Sync worker nudged");
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
            self.run_pass().await;
        }
    }

    /// How long to sleep before the next pass: until the earliest due item,
    /// capped at the fixed interval. Idle ticks get jitter so co-located
    /// gateways don't sync in lock-step.
    fn next_sleep(&self) -> Duration {
        let interval = Duration::from_secs(self.config.interval_secs);
        match self.queue.next_due_in() {
            Ok(Some(due_in)) if due_in < interval => due_in,
            Ok(_) => {
                let jitter_ms = rand::thread_rng().gen_range(0..=self.config.jitter_secs * 1000);
                interval + Duration::from_millis(jitter_ms)
            }
            Err(e) => {
                warn!(error = %e, "Could not inspect queue for next due time");
                interval
            }
        }
    }

    /// One sync pass: claim due items, attempt delivery, record outcomes.
    async fn run_pass(&mut self) {
        let items = match self.queue.take_due(self.config.batch_limit) {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Sync pass could not claim items");
                return;
            }
        };
        if items.is_empty() {
            return;
        }

        debug!(count = items.len(), "Sync pass starting");
        let mut delivered = 0usize;
        let mut transient_streak = 0usize;
        let mut abort = false;

        let mut items = items.into_iter();
        for item in items.by_ref() {
            match self.deliverer.deliver(&item).await {
                DeliveryOutcome::Delivered => {
                    transient_streak = 0;
                    delivered += 1;
                    if self.consecutive_failures > 0 {
                        info!(
                            after_failures = self.consecutive_failures,
                            "Connectivity restored, draining queue"
                        );
                    }
                    self.consecutive_failures = 0;
                    match self.queue.mark_synced(item.id) {
                        Ok(synced) => self.audit_stage(
                            &item,
                            AuditStage::SyncSuccess,
                            Some(&format!("sync attempt {}", synced.retry_count + 1)),
                        ),
                        Err(e) => error!(id = %item.id, error = %e, "Could not mark item synced"),
                    }
                }
                DeliveryOutcome::AuthFailure { status } => {
                    // credential problems are global — one alert, stop the pass
                    self.alerts.raise(Alert::new(AlertKind::AuthFailure { status }));
                    self.fail_item(&item, &format!("auth rejected (HTTP {})", status));
                    abort = true;
                }
                DeliveryOutcome::TransientFailure(msg) => {
                    self.consecutive_failures += 1;
                    transient_streak += 1;
                    self.fail_item(&item, &msg);
                    if transient_streak >= PASS_ABORT_AFTER_FAILURES {
                        warn!(
                            streak = transient_streak,
                            "Endpoint unreachable, aborting sync pass early"
                        );
                        abort = true;
                    }
                }
            }
            if abort {
                break;
            }
        }

        if abort {
            let mut released = 0usize;
            for rest in items {
                if let Err(e) = self.queue.release_claim(rest.id) {
                    error!(id = %rest.id, error = %e, "Could not release unattempted claim");
                }
                released += 1;
            }
            if released > 0 {
                debug!(released = released, "Released unattempted claims");
            }
        }

        if delivered > 0 {
            info!(delivered = delivered, "Sync pass delivered queued features");
        }
    }

    fn fail_item(&self, item: &QueueItem, error: &str) {
        match self.queue.record_failure(item.id, error) {
            Ok(updated) if updated.status == SyncStatus::Failed => {
                self.alerts.raise(Alert::new(AlertKind::RetriesExhausted {
                    item_id: updated.id,
                    retry_count: updated.retry_count,
                }));
                self.audit_stage(item, AuditStage::SyncExhausted, Some(error));
            }
            Ok(_) => {}
            Err(e) => error!(id = %item.id, error = %e, "Could not record delivery failure"),
        }
    }

    fn audit_stage(&self, item: &QueueItem, stage: AuditStage, detail: Option<&str>) {
        if let Some(audit) = &self.audit {
            let record =
                AuditRecord::new(item.id, &item.feature.properties.source_id, stage, detail);
            if let Err(e) = audit.append(record) {
                warn!(error = %e, "Audit write failed");
            }
        }
    }
}
