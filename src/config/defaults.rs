//! System-wide default constants.
//!
//! Centralises the gateway's magic numbers so each threshold has exactly one
//! home. Grouped by subsystem for easy discovery. Every value here can be
//! overridden through `tacfeed.toml` — see [`GatewayConfig`](super::GatewayConfig).

// ============================================================================
// Validation
// ============================================================================

/// GPS accuracy above this forces a RED flag (meters).
pub const ACCURACY_RED_THRESHOLD_M: f64 = 1_000.0;

/// GPS accuracy must be strictly below this for a GREEN flag (meters).
///
/// Exactly 500 m resolves YELLOW — GREEN requires strict inequality.
pub const ACCURACY_GREEN_THRESHOLD_M: f64 = 500.0;

/// Normalized confidence below this forces a RED flag.
pub const CONFIDENCE_RED_CUTOFF: f64 = 0.4;

/// Normalized confidence must be strictly above this for a GREEN flag.
///
/// Exactly 0.6 resolves YELLOW — GREEN requires strict inequality.
pub const CONFIDENCE_GREEN_CUTOFF: f64 = 0.6;

/// Normalized confidence for the text label "high".
pub const CONFIDENCE_LABEL_HIGH: f64 = 0.8;

/// Normalized confidence for the text label "medium".
pub const CONFIDENCE_LABEL_MEDIUM: f64 = 0.5;

/// Normalized confidence for the text label "low".
pub const CONFIDENCE_LABEL_LOW: f64 = 0.2;

// ============================================================================
// Offline Queue
// ============================================================================

/// Maximum pending backlog before `enqueue` refuses new items.
pub const MAX_QUEUE_SIZE: usize = 10_000;

/// Consecutive sync failures before an item transitions to terminal FAILED.
pub const MAX_RETRIES: u32 = 5;

/// Base delay for the retry backoff schedule (milliseconds).
pub const BACKOFF_BASE_MS: u64 = 100;

/// Growth factor per retry: `delay = base * 1.5^retry_count`.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Upper bound on any single retry delay (seconds).
pub const BACKOFF_CAP_SECS: u64 = 30;

/// Claims older than this are released back to PENDING_SYNC on startup.
///
/// Must stay well above the delivery timeout so a live worker never has its
/// claim stolen mid-flight.
pub const CLAIM_STALENESS_SECS: u64 = 300;

/// Terminal SYNCED/FAILED rows older than this are pruned at startup (days).
pub const QUEUE_RETENTION_DAYS: i64 = 30;

/// Pending backlog ratio at which a saturation alert is raised.
pub const QUEUE_SATURATION_WARN_RATIO: f64 = 0.8;

// ============================================================================
// Sync Worker
// ============================================================================

/// Fixed sync interval when nothing is due sooner (seconds).
pub const SYNC_INTERVAL_SECS: u64 = 30;

/// Maximum items claimed per sync pass.
pub const SYNC_BATCH_LIMIT: usize = 32;

/// Random jitter added to idle ticks so co-located gateways don't hammer the
/// same endpoint in lock-step (seconds).
pub const SYNC_JITTER_SECS: u64 = 2;

// ============================================================================
// Delivery
// ============================================================================

/// Per-push delivery timeout (seconds).
pub const DELIVERY_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Pipeline
// ============================================================================

/// End-to-end latency target per detection when the endpoint is reachable (ms).
///
/// A warning threshold, not a guarantee — the pipeline queues instead of
/// blocking when the endpoint is down.
pub const PROCESS_TARGET_MS: u128 = 2_000;

// ============================================================================
// Shutdown
// ============================================================================

/// Grace period for in-flight deliveries on shutdown (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 15;
