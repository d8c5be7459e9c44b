//! Raw detection input types and validation verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detection event as emitted by an upstream AI source.
///
/// This is the wire shape the gateway ingests: JSON carrying whatever
/// confidence convention the source uses. `received_at` is stamped by the
/// gateway at ingestion, never trusted from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    /// Stable identifier of the emitting source (camera, drone, sensor model)
    pub source_id: String,
    /// Detected object class as reported by the source (e.g. "vehicle")
    pub object_class: String,
    /// Latitude in decimal degrees (WGS84)
    pub latitude: f64,
    /// Longitude in decimal degrees (WGS84)
    pub longitude: f64,
    /// Source-reported confidence plus the scale it is expressed in
    pub confidence: RawConfidence,
    /// Estimated GPS accuracy of the fix (meters)
    pub accuracy_meters: f64,
    /// When the source claims the detection occurred
    pub detected_at: DateTime<Utc>,
    /// When the gateway ingested the event
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    /// Source-specific passthrough fields (sensor mode, track ID, ...)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Source confidence exactly as reported, before normalization.
///
/// Preserved verbatim on every output feature so analysts can audit what the
/// detector actually said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConfidence {
    /// The reported value — numeric or a text label, depending on the scale
    pub value: ConfidenceValue,
    /// Scale tag declaring the source convention:
    /// `"0-1"`, `"0-100"`, `"percent"`, or `"label"`
    pub scale: String,
}

impl RawConfidence {
    pub fn numeric(value: f64, scale: &str) -> Self {
        Self {
            value: ConfidenceValue::Number(value),
            scale: scale.to_string(),
        }
    }

    pub fn label(value: &str) -> Self {
        Self {
            value: ConfidenceValue::Label(value.to_string()),
            scale: "label".to_string(),
        }
    }
}

/// A confidence value that may be numeric or a text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfidenceValue {
    Number(f64),
    Label(String),
}

impl std::fmt::Display for ConfidenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceValue::Number(n) => write!(f, "{}", n),
            ConfidenceValue::Label(s) => write!(f, "{}", s),
        }
    }
}

/// Traffic-light quality flag attached to every output feature.
///
/// RED rules take precedence: a detection that trips any RED condition is RED
/// no matter how good its remaining fields look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyFlag {
    /// Accuracy strictly below 500 m AND confidence strictly above 0.6
    Green,
    /// Everything between GREEN and RED, boundary values included
    Yellow,
    /// Out-of-range coordinates, accuracy above 1 000 m, or confidence below 0.4
    Red,
}

impl std::fmt::Display for AccuracyFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccuracyFlag::Green => write!(f, "GREEN"),
            AccuracyFlag::Yellow => write!(f, "YELLOW"),
            AccuracyFlag::Red => write!(f, "RED"),
        }
    }
}

/// A detection that has passed validation.
///
/// Carries the original alongside the normalized confidence and the quality
/// verdict so translation never re-derives either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedDetection {
    pub detection: RawDetection,
    /// Confidence mapped onto the canonical 0.0–1.0 scale
    pub confidence_normalized: f64,
    pub accuracy_flag: AccuracyFlag,
    /// Set when out-of-range coordinates demand a human look downstream
    pub requires_manual_review: bool,
}
