//! Offline-first delivery: durable queue, retry backoff, background sync
//!
//! The contract in one line: a feature the pipeline has accepted is on disk
//! before anyone is told, and stays there until the endpoint acknowledges it
//! or retries run out.

mod backoff;
mod queue;
mod storage;
mod worker;

pub use backoff::BackoffPolicy;
pub use queue::{OfflineQueue, QueueError, QueueStats};
pub use storage::{MemoryQueueStorage, QueueStorage, SledQueueStorage, StorageError};
pub use worker::{SyncHandle, SyncWorker};
