//! TACFEED: Tactical Detection Feed Gateway
//!
//! Converts heterogeneous AI object-detection events into a standardized
//! geospatial feed for tactical awareness endpoints.
//!
//! ## Architecture
//!
//! - **Validator**: Confidence normalization and accuracy flagging
//! - **Translator**: Raw detections into GeoJSON point features
//! - **Delivery**: Timeout-bounded pushes to the feed endpoint (GeoJSON or CoT XML)
//! - **Offline Queue**: Durable store-and-forward with retry backoff
//! - **Sync Worker**: Background drain that survives endpoint outages

pub mod alerts;
pub mod audit;
pub mod config;
pub mod cot;
pub mod delivery;
pub mod offline;
pub mod pipeline;
pub mod translator;
pub mod types;
pub mod validator;

// Re-export gateway configuration
pub use config::GatewayConfig;

// Re-export commonly used types
pub use types::{
    AccuracyFlag, ConfidenceValue, FeatureProperties, PointGeometry, QueueItem, RawConfidence,
    RawDetection, StandardFeature, SyncStatus, ValidatedDetection,
};

// Re-export pipeline components
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome, PipelineStats};

// Re-export queue components
pub use offline::{OfflineQueue, QueueError, QueueStats, SledQueueStorage, SyncWorker};

// Re-export delivery components
pub use delivery::{Deliverer, DeliveryOutcome, FeedFormat, HttpTacticalSink, TacticalSink};
