//! QueueStorage trait — pluggable backing store for the offline queue
//!
//! Abstracts queue persistence so the queue logic can be exercised without
//! disk:
//! - `SledQueueStorage`: durable production backend
//! - `MemoryQueueStorage`: in-memory store for tests and ephemeral runs

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::error;
use uuid::Uuid;

use crate::types::QueueItem;

/// Trait for pluggable queue storage backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks. On backends that claim durability, `put` must be
/// durable when it returns — the pipeline acks sources only after `put`
/// succeeds.
pub trait QueueStorage: Send + Sync {
    /// Insert or overwrite an item keyed by its UUID.
    fn put(&self, item: &QueueItem) -> Result<(), StorageError>;

    /// Fetch one item.
    fn get(&self, id: Uuid) -> Result<Option<QueueItem>, StorageError>;

    /// Remove one item. Removing an absent item is not an error.
    fn delete(&self, id: Uuid) -> Result<(), StorageError>;

    /// All stored items, in no particular order.
    fn list(&self) -> Result<Vec<QueueItem>, StorageError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

fn sled_err(e: sled::Error) -> StorageError {
    StorageError::Storage(e.to_string())
}

/// Durable sled-backed storage.
///
/// Every `put` flushes, so an acked item survives power loss, not just a
/// process crash. `delete` does not flush — re-deleting after a crash is
/// harmless.
pub struct SledQueueStorage {
    tree: sled::Tree,
}

impl SledQueueStorage {
    /// Open the queue tree inside an existing sled database.
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree("offline_queue").map_err(sled_err)?;
        Ok(Self { tree })
    }
}

impl QueueStorage for SledQueueStorage {
    fn put(&self, item: &QueueItem) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(item)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.tree.insert(item.id.as_bytes(), bytes).map_err(sled_err)?;
        self.tree.flush().map_err(sled_err)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<QueueItem>, StorageError> {
        match self.tree.get(id.as_bytes()).map_err(sled_err)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.tree.remove(id.as_bytes()).map_err(sled_err)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<QueueItem>, StorageError> {
        let mut items = Vec::new();
        let mut corrupted = Vec::new();

        for entry in self.tree.iter() {
            let (key, bytes) = entry.map_err(sled_err)?;
            match serde_json::from_slice::<QueueItem>(&bytes) {
                Ok(item) => items.push(item),
                Err(e) => {
                    error!(error = %e, "Corrupted queue entry — removing");
                    corrupted.push(key);
                }
            }
        }

        for key in corrupted {
            let _ = self.tree.remove(key);
        }

        Ok(items)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

/// In-memory storage for tests and ephemeral deployments
///
/// Thread-safe via `RwLock`. Not durable — data lost on restart.
pub struct MemoryQueueStorage {
    items: RwLock<HashMap<Uuid, QueueItem>>,
}

impl MemoryQueueStorage {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryQueueStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStorage for MemoryQueueStorage {
    fn put(&self, item: &QueueItem) -> Result<(), StorageError> {
        let mut items = self
            .items
            .write()
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        items.insert(item.id, item.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<QueueItem>, StorageError> {
        let items = self
            .items
            .read()
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        Ok(items.get(&id).cloned())
    }

    fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let mut items = self
            .items
            .write()
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        items.remove(&id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<QueueItem>, StorageError> {
        let items = self
            .items
            .read()
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        Ok(items.values().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
