//! Offline queue — durable write-ahead parking for undeliverable features
//!
//! Semantics, in order of importance:
//! - `enqueue` is write-ahead: the item is durable before the caller acks
//!   its source
//! - `take_due` claims items, so concurrent passes never double-deliver
//! - SYNCED and FAILED are terminal; rows stay for audit until pruned
//!
//! Claims are both persisted (`claimed_at`, for crash recovery) and tracked
//! in-process (for mutual exclusion between passes without re-reading disk).

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::storage::{QueueStorage, StorageError};
use crate::config::defaults;
use crate::config::QueueConfig;
use crate::types::{QueueItem, SyncStatus};

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue full: {pending} pending items at capacity {capacity}")]
    Full { pending: usize, capacity: usize },

    #[error("item {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Point-in-time queue composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    /// Awaiting delivery (includes in-flight)
    pub pending: usize,
    /// Pending items currently claimed by a sync pass
    pub in_flight: usize,
    /// Delivered, kept for audit
    pub synced: usize,
    /// Retries exhausted, kept for audit
    pub failed: usize,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pending={} in_flight={} synced={} failed={}",
            self.pending, self.in_flight, self.synced, self.failed
        )
    }
}

/// Disk-backed offline queue with claim-then-attempt delivery hand-off.
pub struct OfflineQueue {
    storage: Arc<dyn QueueStorage>,
    backoff: BackoffPolicy,
    max_size: usize,
    max_retries: u32,
    claim_staleness: ChronoDuration,
    /// Non-terminal item count, mirrored from storage for the capacity gate
    pending: AtomicUsize,
    /// Items handed out by `take_due` in this process
    claimed: Mutex<HashSet<Uuid>>,
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Storage(format!("claim set lock poisoned: {}", e))
}

impl OfflineQueue {
    /// Open a queue over the given storage, recovering state left by a
    /// previous run: the pending counter is rebuilt and claims older than the
    /// staleness window are released back to PENDING_SYNC.
    pub fn open(storage: Arc<dyn QueueStorage>, config: &QueueConfig) -> Result<Self, QueueError> {
        let queue = Self {
            storage,
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.backoff_base_ms),
                defaults::BACKOFF_MULTIPLIER,
                Duration::from_secs(config.backoff_cap_secs),
            ),
            max_size: config.max_size,
            max_retries: config.max_retries,
            claim_staleness: ChronoDuration::seconds(config.claim_staleness_secs as i64),
            pending: AtomicUsize::new(0),
            claimed: Mutex::new(HashSet::new()),
        };
        queue.recover()?;
        Ok(queue)
    }

    /// Rebuild the pending counter and release claims left by a crash.
    fn recover(&self) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut pending = 0usize;
        let mut released = 0usize;

        for mut item in self.storage.list()? {
            if item.status != SyncStatus::PendingSync {
                continue;
            }
            pending += 1;
            if let Some(claimed_at) = item.claimed_at {
                if now - claimed_at >= self.claim_staleness {
                    item.claimed_at = None;
                    self.storage.put(&item)?;
                    released += 1;
                }
            }
        }

        self.pending.store(pending, Ordering::SeqCst);
        if pending > 0 {
            info!(
                pending = pending,
                released_claims = released,
                backend = self.storage.backend_name(),
                "Offline queue opened with pending items"
            );
        } else {
            debug!(backend = self.storage.backend_name(), "Offline queue opened (empty)");
        }
        Ok(())
    }

    /// Park an item. Write-ahead: durable before this returns.
    ///
    /// Callers that intend an immediate in-line delivery attempt should
    /// enqueue the item pre-claimed (`claimed_at` set) so a concurrent sync
    /// pass doesn't race them; `mark_synced` / `record_initial_failure`
    /// release the claim afterwards.
    pub fn enqueue(&self, item: &QueueItem) -> Result<(), QueueError> {
        let pending = self.pending.load(Ordering::SeqCst);
        if pending >= self.max_size {
            warn!(
                pending = pending,
                capacity = self.max_size,
                "Offline queue full — refusing item"
            );
            return Err(QueueError::Full {
                pending,
                capacity: self.max_size,
            });
        }

        self.storage.put(item)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(id = %item.id, pending = pending + 1, "Feature queued for sync");
        Ok(())
    }

    /// Claim up to `limit` items due another delivery attempt, oldest first.
    ///
    /// Claimed items are invisible to other passes until `mark_synced`,
    /// `record_failure`, or `release_claim` lets go of them.
    pub fn take_due(&self, limit: usize) -> Result<Vec<QueueItem>, QueueError> {
        let now = Utc::now();
        let mut claimed_set = self.claimed.lock().map_err(lock_err)?;

        let mut due: Vec<QueueItem> = self
            .storage
            .list()?
            .into_iter()
            .filter(|item| item.status == SyncStatus::PendingSync)
            .filter(|item| !claimed_set.contains(&item.id))
            .filter(|item| !self.claim_is_fresh(item, now))
            .filter(|item| self.is_due(item, now))
            .collect();
        due.sort_by_key(|item| item.created_at);
        due.truncate(limit);

        let mut taken = Vec::with_capacity(due.len());
        for mut item in due {
            item.claimed_at = Some(now);
            // claim hits storage before the item is handed out
            self.storage.put(&item)?;
            claimed_set.insert(item.id);
            taken.push(item);
        }

        if !taken.is_empty() {
            debug!(count = taken.len(), "Claimed items for sync pass");
        }
        Ok(taken)
    }

    /// Terminal success. The row stays as SYNCED for audit.
    pub fn mark_synced(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        let mut item = self.storage.get(id)?.ok_or(QueueError::NotFound(id))?;
        let was_pending = item.status == SyncStatus::PendingSync;

        item.status = SyncStatus::Synced;
        item.claimed_at = None;
        item.error_message = None;
        item.last_attempt_at = Some(Utc::now());
        self.storage.put(&item)?;
        self.release_in_process(id)?;

        if was_pending {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        debug!(id = %id, "Queued item synced");
        Ok(item)
    }

    /// Record a failed sync-worker attempt: bump the retry counter, stamp the
    /// attempt, and either re-park the item for backoff or — once retries are
    /// exhausted — mark it terminal FAILED.
    pub fn record_failure(&self, id: Uuid, error: &str) -> Result<QueueItem, QueueError> {
        let mut item = self.storage.get(id)?.ok_or(QueueError::NotFound(id))?;
        let was_pending = item.status == SyncStatus::PendingSync;

        item.retry_count += 1;
        item.last_attempt_at = Some(Utc::now());
        item.claimed_at = None;
        item.error_message = Some(error.to_string());
        if item.retry_count >= self.max_retries {
            item.status = SyncStatus::Failed;
        }
        self.storage.put(&item)?;
        self.release_in_process(id)?;

        if item.status == SyncStatus::Failed {
            if was_pending {
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
            warn!(
                id = %id,
                retries = item.retry_count,
                error = error,
                "Item exhausted retries, marked FAILED"
            );
        } else {
            debug!(
                id = %id,
                retries = item.retry_count,
                error = error,
                "Sync attempt failed, backing off"
            );
        }
        Ok(item)
    }

    /// Record the pipeline's in-line attempt failing. Stamps the attempt time
    /// and error and releases the enqueue-time claim, but does NOT count
    /// against the retry budget — the worker's schedule starts from here.
    pub fn record_initial_failure(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut item = self.storage.get(id)?.ok_or(QueueError::NotFound(id))?;
        item.last_attempt_at = Some(Utc::now());
        item.claimed_at = None;
        item.error_message = Some(error.to_string());
        self.storage.put(&item)?;
        self.release_in_process(id)?;
        Ok(())
    }

    /// Release a claim without recording an attempt (pass aborted before the
    /// item was tried).
    pub fn release_claim(&self, id: Uuid) -> Result<(), QueueError> {
        if let Some(mut item) = self.storage.get(id)? {
            if item.claimed_at.is_some() {
                item.claimed_at = None;
                self.storage.put(&item)?;
            }
        }
        self.release_in_process(id)?;
        Ok(())
    }

    /// Fast-path pending count (capacity gate reads this, not storage).
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Time until the earliest pending unclaimed item becomes due. `None`
    /// when nothing is waiting; zero when something is due right now.
    pub fn next_due_in(&self) -> Result<Option<Duration>, QueueError> {
        let now = Utc::now();
        let claimed_set = self.claimed.lock().map_err(lock_err)?;
        let mut earliest: Option<ChronoDuration> = None;

        for item in self.storage.list()? {
            if item.status != SyncStatus::PendingSync {
                continue;
            }
            if claimed_set.contains(&item.id) || self.claim_is_fresh(&item, now) {
                continue;
            }
            let until = match item.last_attempt_at {
                None => ChronoDuration::zero(),
                Some(last) => (last + self.delay_after(&item) - now).max(ChronoDuration::zero()),
            };
            earliest = Some(earliest.map_or(until, |e| e.min(until)));
        }

        Ok(earliest.map(|d| d.to_std().unwrap_or_default()))
    }

    /// Scan storage for a full status breakdown.
    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let now = Utc::now();
        let mut stats = QueueStats::default();
        for item in self.storage.list()? {
            match item.status {
                SyncStatus::PendingSync => {
                    stats.pending += 1;
                    if self.claim_is_fresh(&item, now) {
                        stats.in_flight += 1;
                    }
                }
                SyncStatus::Synced => stats.synced += 1,
                SyncStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Delete terminal rows whose last activity is older than `older_than`.
    /// Returns how many were removed.
    pub fn prune_terminal(&self, older_than: ChronoDuration) -> Result<usize, QueueError> {
        let cutoff = Utc::now() - older_than;
        let mut removed = 0usize;

        for item in self.storage.list()? {
            if !item.status.is_terminal() {
                continue;
            }
            let reference = item.last_attempt_at.unwrap_or(item.created_at);
            if reference < cutoff {
                self.storage.delete(item.id)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, "Pruned terminal queue rows");
        }
        Ok(removed)
    }

    fn release_in_process(&self, id: Uuid) -> Result<(), QueueError> {
        let mut claimed_set = self.claimed.lock().map_err(lock_err)?;
        claimed_set.remove(&id);
        Ok(())
    }

    fn is_due(&self, item: &QueueItem, now: DateTime<Utc>) -> bool {
        match item.last_attempt_at {
            None => true,
            Some(last) => last + self.delay_after(item) <= now,
        }
    }

    fn delay_after(&self, item: &QueueItem) -> ChronoDuration {
        let delay = self.backoff.delay_for(item.retry_count);
        ChronoDuration::milliseconds(delay.as_millis() as i64)
    }

    fn claim_is_fresh(&self, item: &QueueItem, now: DateTime<Utc>) -> bool {
        item.claimed_at.is_some_and(|t| now - t < self.claim_staleness)
    }
}
