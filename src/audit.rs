//! Audit trail — stage-by-stage record of every detection's journey
//!
//! Append-only rows in a sled tree, keyed by `(nanos, seq)` so iteration is
//! chronological. Every write also emits a structured tracing event, so the
//! journey is visible in logs even when nobody queries the tree.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Pipeline stages recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditStage {
    /// Raw detection accepted from a source
    Received,
    /// Passed validation (normalized + flagged)
    Validated,
    /// Standardized feature produced
    Translated,
    /// Delivered on the first, in-line attempt
    Delivered,
    /// Parked in the offline queue
    Queued,
    /// Sync worker delivered a queued item
    SyncSuccess,
    /// Retries exhausted, item marked FAILED
    SyncExhausted,
}

impl std::fmt::Display for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStage::Received => write!(f, "received"),
            AuditStage::Validated => write!(f, "validated"),
            AuditStage::Translated => write!(f, "translated"),
            AuditStage::Delivered => write!(f, "delivered"),
            AuditStage::Queued => write!(f, "queued"),
            AuditStage::SyncSuccess => write!(f, "sync-success"),
            AuditStage::SyncExhausted => write!(f, "sync-exhausted"),
        }
    }
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Correlation ID — becomes the queue item UUID once the item exists
    pub item_id: Uuid,
    pub source_id: String,
    pub stage: AuditStage,
    pub timestamp: DateTime<Utc>,
    /// Stage-specific detail (rejection reason, attempt number, ...)
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Build a record stamped now.
    pub fn new(item_id: Uuid, source_id: &str, stage: AuditStage, detail: Option<&str>) -> Self {
        Self {
            item_id,
            source_id: source_id.to_string(),
            stage,
            timestamp: Utc::now(),
            detail: detail.map(str::to_string),
        }
    }
}

/// Where audit records go. The pipeline and sync worker write through this
/// seam; storage and retention are the implementation's business. Appends are
/// best-effort from the caller's point of view — a failed append is logged
/// and never blocks delivery.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only audit trail persisted in a sled tree.
pub struct AuditTrail {
    tree: sled::Tree,
    seq: AtomicU64,
}

impl AuditTrail {
    /// Open the audit tree inside an existing sled database.
    pub fn open(db: &sled::Db) -> Result<Self, AuditError> {
        let tree = db.open_tree("audit")?;
        Ok(Self {
            tree,
            seq: AtomicU64::new(0),
        })
    }

    /// Append a stage transition for an item.
    pub fn record(
        &self,
        item_id: Uuid,
        source_id: &str,
        stage: AuditStage,
        detail: Option<&str>,
    ) -> Result<(), AuditError> {
        self.append(AuditRecord::new(item_id, source_id, stage, detail))
    }

    /// Most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Vec::with_capacity(limit);
        for entry in self.tree.iter().rev().take(limit) {
            let (_, bytes) = entry?;
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }

    /// Full journey of one item, oldest first.
    pub fn for_item(&self, item_id: Uuid) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            let record: AuditRecord = serde_json::from_slice(&bytes)?;
            if record.item_id == item_id {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Total rows currently held.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl AuditSink for AuditTrail {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        // Key: nanos since epoch + per-process sequence, so two writes in the
        // same nanosecond never collide.
        let nanos = record.timestamp.timestamp_nanos_opt().unwrap_or_default() as u64;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&nanos.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());

        debug!(
            item_id = %record.item_id,
            source_id = %record.source_id,
            stage = %record.stage,
            "Audit"
        );
        self.tree.insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }
}
