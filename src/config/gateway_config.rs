//! Gateway Configuration - All runtime tunables as operator-editable TOML values
//!
//! Every threshold and knob has a built-in default matching `defaults`, so the
//! gateway runs with zero configuration and a partial file only overrides the
//! keys it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::delivery::FeedFormat;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a gateway deployment.
///
/// Load with `GatewayConfig::load()` which searches:
/// 1. `$TACFEED_CONFIG` env var
/// 2. `./tacfeed.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway identification
    #[serde(default)]
    pub gateway: GatewayInfo,

    /// Validation thresholds (accuracy flag, confidence cutoffs)
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Offline queue sizing, retry policy, and storage location
    #[serde(default)]
    pub queue: QueueConfig,

    /// Delivery endpoint and feed format
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Background sync worker cadence
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayInfo::default(),
            validation: ValidationConfig::default(),
            queue: QueueConfig::default(),
            delivery: DeliveryConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TACFEED_CONFIG` environment variable
    /// 2. `./tacfeed.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("TACFEED_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), gateway = %config.gateway.name, "Loaded config from TACFEED_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from TACFEED_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "TACFEED_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("tacfeed.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(gateway = %config.gateway.name, "Loaded config from ./tacfeed.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./tacfeed.toml, using defaults");
                }
            }
        }

        info!("No tacfeed.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all tunables for internal consistency.
    ///
    /// Rules:
    /// - GREEN accuracy threshold must be below the RED threshold
    /// - Confidence cutoffs must lie in (0, 1) with red below green
    /// - Queue sizing, retry, and timing values must be non-zero
    /// - The delivery endpoint must be an http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let v = &self.validation;
        if v.accuracy_green_threshold_m >= v.accuracy_red_threshold_m {
            errors.push(format!(
                "validation.accuracy_green_threshold_m ({:.0}) must be less than accuracy_red_threshold_m ({:.0})",
                v.accuracy_green_threshold_m, v.accuracy_red_threshold_m
            ));
        }
        if v.accuracy_green_threshold_m <= 0.0 {
            errors.push("validation.accuracy_green_threshold_m must be > 0".to_string());
        }
        for (name, cutoff) in [
            ("confidence_red_cutoff", v.confidence_red_cutoff),
            ("confidence_green_cutoff", v.confidence_green_cutoff),
        ] {
            if !(0.0..=1.0).contains(&cutoff) {
                errors.push(format!(
                    "validation.{} ({}) must lie within [0, 1]",
                    name, cutoff
                ));
            }
        }
        if v.confidence_red_cutoff >= v.confidence_green_cutoff {
            errors.push(format!(
                "validation.confidence_red_cutoff ({:.2}) must be less than confidence_green_cutoff ({:.2})",
                v.confidence_red_cutoff, v.confidence_green_cutoff
            ));
        }

        let q = &self.queue;
        if q.max_size == 0 {
            errors.push("queue.max_size must be > 0".to_string());
        }
        if q.max_retries == 0 {
            errors.push("queue.max_retries must be > 0".to_string());
        }
        if q.backoff_base_ms == 0 {
            errors.push("queue.backoff_base_ms must be > 0".to_string());
        }
        if q.backoff_cap_secs == 0 {
            errors.push("queue.backoff_cap_secs must be > 0".to_string());
        }
        if q.claim_staleness_secs == 0 {
            errors.push("queue.claim_staleness_secs must be > 0".to_string());
        }
        if q.retention_days <= 0 {
            errors.push("queue.retention_days must be > 0".to_string());
        }

        let d = &self.delivery;
        if !d.endpoint_url.starts_with("http://") && !d.endpoint_url.starts_with("https://") {
            errors.push(format!(
                "delivery.endpoint_url must be an http(s) URL, got '{}'",
                d.endpoint_url
            ));
        }
        if d.timeout_secs == 0 {
            errors.push("delivery.timeout_secs must be > 0".to_string());
        }

        let s = &self.sync;
        if s.interval_secs == 0 {
            errors.push("sync.interval_secs must be > 0".to_string());
        }
        if s.batch_limit == 0 {
            errors.push("sync.batch_limit must be > 0".to_string());
        }

        // NaN/Inf comparisons silently pass above — sweep all float fields
        // through serialization to catch them
        if let Ok(serialized) = toml::to_string(self) {
            if serialized.contains("nan") || serialized.contains("inf") {
                errors.push(
                    "Config contains NaN or Inf values — all thresholds must be finite numbers"
                        .to_string(),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Gateway Info
// ============================================================================

/// Identification metadata — not used for logic, but appears in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInfo {
    /// Gateway instance name
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Operating area label
    #[serde(default)]
    pub zone: String,
}

fn default_gateway_name() -> String {
    "tacfeed".to_string()
}

impl Default for GatewayInfo {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            zone: String::new(),
        }
    }
}

// ============================================================================
// Validation Thresholds
// ============================================================================

/// Accuracy-flag and confidence thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reported accuracy above this is RED (meters)
    #[serde(default = "default_accuracy_red")]
    pub accuracy_red_threshold_m: f64,

    /// Reported accuracy strictly below this qualifies for GREEN (meters)
    #[serde(default = "default_accuracy_green")]
    pub accuracy_green_threshold_m: f64,

    /// Normalized confidence strictly below this is RED
    #[serde(default = "default_confidence_red")]
    pub confidence_red_cutoff: f64,

    /// Normalized confidence strictly above this qualifies for GREEN
    #[serde(default = "default_confidence_green")]
    pub confidence_green_cutoff: f64,
}

fn default_accuracy_red() -> f64 {
    defaults::ACCURACY_RED_THRESHOLD_M
}
fn default_accuracy_green() -> f64 {
    defaults::ACCURACY_GREEN_THRESHOLD_M
}
fn default_confidence_red() -> f64 {
    defaults::CONFIDENCE_RED_CUTOFF
}
fn default_confidence_green() -> f64 {
    defaults::CONFIDENCE_GREEN_CUTOFF
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            accuracy_red_threshold_m: default_accuracy_red(),
            accuracy_green_threshold_m: default_accuracy_green(),
            confidence_red_cutoff: default_confidence_red(),
            confidence_green_cutoff: default_confidence_green(),
        }
    }
}

// ============================================================================
// Offline Queue
// ============================================================================

/// Queue sizing, retry policy, claim recovery, and storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory for the embedded queue/audit database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum PENDING_SYNC items before enqueue refuses
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Sync attempts before an item goes FAILED
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; later retries grow geometrically from this
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling on any single retry delay
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Claims older than this are treated as crash leftovers and released
    #[serde(default = "default_claim_staleness_secs")]
    pub claim_staleness_secs: u64,

    /// SYNCED/FAILED rows older than this are pruned at startup
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_max_size() -> usize {
    defaults::MAX_QUEUE_SIZE
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_backoff_base_ms() -> u64 {
    defaults::BACKOFF_BASE_MS
}
fn default_backoff_cap_secs() -> u64 {
    defaults::BACKOFF_CAP_SECS
}
fn default_claim_staleness_secs() -> u64 {
    defaults::CLAIM_STALENESS_SECS
}
fn default_retention_days() -> i64 {
    defaults::QUEUE_RETENTION_DAYS
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_size: default_max_size(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_secs: default_backoff_cap_secs(),
            claim_staleness_secs: default_claim_staleness_secs(),
            retention_days: default_retention_days(),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Where and how standardized features get pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Tactical feed endpoint
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Bearer token for the endpoint, if it wants one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Wire format: "geojson" or "cot-xml"
    #[serde(default)]
    pub format: FeedFormat,

    /// Per-attempt delivery timeout
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint_url() -> String {
    "http://127.0.0.1:8087/features".to_string()
}
fn default_delivery_timeout_secs() -> u64 {
    defaults::DELIVERY_TIMEOUT_SECS
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            api_key: None,
            format: FeedFormat::default(),
            timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

// ============================================================================
// Sync Worker
// ============================================================================

/// Background sync cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Baseline seconds between passes when nothing is due sooner
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,

    /// Items claimed per pass
    #[serde(default = "default_sync_batch_limit")]
    pub batch_limit: usize,

    /// Random jitter added to each sleep so restarted fleets don't thunder
    #[serde(default = "default_sync_jitter_secs")]
    pub jitter_secs: u64,
}

fn default_sync_interval_secs() -> u64 {
    defaults::SYNC_INTERVAL_SECS
}
fn default_sync_batch_limit() -> usize {
    defaults::SYNC_BATCH_LIMIT
}
fn default_sync_jitter_secs() -> u64 {
    defaults::SYNC_JITTER_SECS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            batch_limit: default_sync_batch_limit(),
            jitter_secs: default_sync_jitter_secs(),
        }
    }
}
