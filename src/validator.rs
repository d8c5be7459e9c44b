//! Detection validator — quality gate between raw sources and the feed
//!
//! Three jobs, in order: normalize confidence onto 0.0–1.0, range-check
//! coordinates, derive the traffic-light accuracy flag. Malformed input is
//! rejected with a typed error; questionable-but-parseable input passes
//! flagged RED so the feed stays complete.

use tracing::debug;

use crate::config::ValidationConfig;
use crate::config::defaults;
use crate::types::{AccuracyFlag, ConfidenceValue, RawConfidence, RawDetection, ValidatedDetection};

/// Errors that reject a detection outright.
///
/// These mean the input cannot be interpreted at all, as opposed to
/// low-quality input, which passes validation flagged RED.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown confidence scale '{0}'")]
    UnknownScale(String),

    #[error("unknown confidence label '{0}' (expected high/medium/low)")]
    UnknownLabel(String),

    #[error("numeric confidence expected for scale '{scale}', got label '{label}'")]
    NonNumericConfidence { scale: String, label: String },

    #[error("text label expected for scale 'label', got numeric {0}")]
    NonTextConfidence(f64),

    #[error("confidence is not a finite number: {0}")]
    NonFiniteConfidence(f64),
}

/// Stateless validator, cheap to share behind an `Arc`.
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a raw detection: normalize confidence, check coordinate
    /// ranges, and attach the quality flag.
    ///
    /// Out-of-range coordinates do NOT reject — the detection passes with a
    /// RED flag and `requires_manual_review` set, so operators see it rather
    /// than losing it.
    pub fn validate(&self, detection: RawDetection) -> Result<ValidatedDetection, ValidationError> {
        let confidence_normalized = self.normalize_confidence(&detection.confidence)?;

        let coords_in_range = coordinates_in_range(detection.latitude, detection.longitude);
        let accuracy_flag =
            self.derive_flag(coords_in_range, detection.accuracy_meters, confidence_normalized);

        if !coords_in_range {
            debug!(
                source_id = %detection.source_id,
                lat = detection.latitude,
                lon = detection.longitude,
                "Coordinates out of WGS84 range, flagging RED for manual review"
            );
        }

        Ok(ValidatedDetection {
            confidence_normalized,
            accuracy_flag,
            requires_manual_review: !coords_in_range,
            detection,
        })
    }

    /// Map a source confidence onto the canonical 0.0–1.0 scale.
    ///
    /// The result is clamped into [0.0, 1.0]: a "0-100" source reporting 104
    /// normalizes to 1.0 instead of poisoning downstream thresholds.
    fn normalize_confidence(&self, raw: &RawConfidence) -> Result<f64, ValidationError> {
        let scale = raw.scale.trim().to_ascii_lowercase();
        let normalized = match scale.as_str() {
            "0-1" => numeric_value(raw, &scale)?,
            "0-100" | "percent" | "percentage" => numeric_value(raw, &scale)? / 100.0,
            "label" | "text" => match &raw.value {
                ConfidenceValue::Label(label) => {
                    match label.trim().to_ascii_lowercase().as_str() {
                        "high" => defaults::CONFIDENCE_LABEL_HIGH,
                        "medium" => defaults::CONFIDENCE_LABEL_MEDIUM,
                        "low" => defaults::CONFIDENCE_LABEL_LOW,
                        _ => return Err(ValidationError::UnknownLabel(label.clone())),
                    }
                }
                ConfidenceValue::Number(n) => return Err(ValidationError::NonTextConfidence(*n)),
            },
            _ => return Err(ValidationError::UnknownScale(raw.scale.clone())),
        };
        Ok(normalized.clamp(0.0, 1.0))
    }

    /// Apply the traffic-light rules. RED wins over GREEN; everything left
    /// over is YELLOW, exact boundary values included.
    fn derive_flag(
        &self,
        coords_in_range: bool,
        accuracy_meters: f64,
        confidence: f64,
    ) -> AccuracyFlag {
        let cfg = &self.config;
        if !coords_in_range
            || !accuracy_meters.is_finite()
            || accuracy_meters > cfg.accuracy_red_threshold_m
            || confidence < cfg.confidence_red_cutoff
        {
            return AccuracyFlag::Red;
        }
        if accuracy_meters < cfg.accuracy_green_threshold_m
            && confidence > cfg.confidence_green_cutoff
        {
            return AccuracyFlag::Green;
        }
        AccuracyFlag::Yellow
    }
}

fn numeric_value(raw: &RawConfidence, scale: &str) -> Result<f64, ValidationError> {
    match &raw.value {
        ConfidenceValue::Number(n) if n.is_finite() => Ok(*n),
        ConfidenceValue::Number(n) => Err(ValidationError::NonFiniteConfidence(*n)),
        ConfidenceValue::Label(label) => Err(ValidationError::NonNumericConfidence {
            scale: scale.to_string(),
            label: label.clone(),
        }),
    }
}

/// WGS84 range check. NaN fails both comparisons, so garbage coordinates
/// land out-of-range rather than sneaking through.
fn coordinates_in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}
