//! Detection translator — validated detections become standardized features
//!
//! Pure and clock-free: everything on the output feature comes from the
//! validated detection, timestamps included. The one subtlety is coordinate
//! order, which flips from the lat/lon sources report to GeoJSON's
//! `[lon, lat]` here and nowhere else.

use crate::types::{FeatureProperties, PointGeometry, StandardFeature, ValidatedDetection};

/// Errors for detections that cannot be expressed as a feature.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),
}

/// Build the standardized GeoJSON-shaped feature for a validated detection.
///
/// `confidence_original` rides along verbatim next to the normalized value so
/// the output self-documents what the detector actually reported.
pub fn translate(validated: ValidatedDetection) -> Result<StandardFeature, TranslationError> {
    let ValidatedDetection {
        detection,
        confidence_normalized,
        accuracy_flag,
        requires_manual_review,
    } = validated;

    if detection.source_id.trim().is_empty() {
        return Err(TranslationError::MissingField("source_id"));
    }
    if detection.object_class.trim().is_empty() {
        return Err(TranslationError::MissingField("object_class"));
    }

    let geometry = PointGeometry::from_lat_lon(detection.latitude, detection.longitude);
    let properties = FeatureProperties {
        source_id: detection.source_id,
        object_class: detection.object_class,
        confidence_normalized,
        confidence_original: detection.confidence,
        accuracy_meters: detection.accuracy_meters,
        accuracy_flag,
        requires_manual_review,
        detected_at: detection.detected_at,
        received_at: detection.received_at,
        metadata: detection.metadata,
    };

    Ok(StandardFeature::new(geometry, properties))
}
