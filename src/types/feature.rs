//! Standardized tactical feature — the gateway's single output shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccuracyFlag, RawConfidence};

/// GeoJSON type tag for a feature object.
pub const FEATURE_TYPE: &str = "Feature";

/// GeoJSON type tag for a point geometry.
pub const POINT_TYPE: &str = "Point";

/// A standardized tactical feature, GeoJSON-shaped.
///
/// Every detection that survives validation becomes exactly one of these.
/// Downstream consumers (TAK bridges, map layers) never see source formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardFeature {
    /// Always `"Feature"`
    #[serde(rename = "type")]
    pub feature_type: String,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

impl StandardFeature {
    pub fn new(geometry: PointGeometry, properties: FeatureProperties) -> Self {
        Self {
            feature_type: FEATURE_TYPE.to_string(),
            geometry,
            properties,
        }
    }
}

/// GeoJSON point geometry.
///
/// Coordinates are `[longitude, latitude]` — GeoJSON axis order, NOT the
/// lat/lon order sources report in. [`PointGeometry::from_lat_lon`] does the
/// swap so callers never hand-order the array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGeometry {
    /// Always `"Point"`
    #[serde(rename = "type")]
    pub geometry_type: String,
    /// `[longitude, latitude]` in decimal degrees
    pub coordinates: [f64; 2],
}

impl PointGeometry {
    /// Build a point from the lat/lon order sources report in.
    pub fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
        Self {
            geometry_type: POINT_TYPE.to_string(),
            coordinates: [longitude, latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Properties block of a standardized feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub source_id: String,
    pub object_class: String,
    /// Confidence on the canonical 0.0–1.0 scale
    pub confidence_normalized: f64,
    /// Source confidence exactly as reported, for audit
    pub confidence_original: RawConfidence,
    pub accuracy_meters: f64,
    pub accuracy_flag: AccuracyFlag,
    pub requires_manual_review: bool,
    pub detected_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Source-specific passthrough fields
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
