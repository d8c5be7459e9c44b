//! Processing Pipeline Module
//!
//! ```text
//! STAGE 1: Ingest     raw detection read from a source (received_at stamped)
//! STAGE 2: Validate   confidence normalized, coordinates checked, flag derived
//! STAGE 3: Translate  standardized GeoJSON-shaped feature built
//! STAGE 4: Persist    feature parked in the offline queue (write-ahead)
//! STAGE 5: Deliver    in-line push; failure leaves the item queued for sync
//! ```
//!
//! CRITICAL GUARANTEE: stage 5 never runs before stage 4 has made the item
//! durable — a crash between them re-delivers, it never loses.

mod orchestrator;
pub mod source;

pub use orchestrator::{Pipeline, PipelineError, PipelineOutcome, PipelineStats};
pub use source::{DetectionSource, ReplaySource, SourceEvent, StdinSource};
