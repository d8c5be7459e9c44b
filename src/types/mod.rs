//! Shared data structures for the detection-to-tactical-feed pipeline
//!
//! Organised by pipeline stage:
//! - Ingest: RawDetection (heterogeneous source events)
//! - Validate: ValidatedDetection, AccuracyFlag
//! - Translate: StandardFeature (GeoJSON-shaped output)
//! - Queue/Sync: QueueItem, SyncStatus

mod detection;
mod feature;
mod queue_item;

pub use detection::*;
pub use feature::*;
pub use queue_item::*;
