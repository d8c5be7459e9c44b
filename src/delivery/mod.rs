//! Feed delivery — pushing standardized features to the configured endpoint

use serde::{Deserialize, Serialize};

mod http;
mod sink;

pub use http::HttpTacticalSink;
pub use sink::{Deliverer, DeliveryOutcome, TacticalSink};

/// Wire format for outbound features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedFormat {
    /// GeoJSON feature per request — the canonical feed shape
    #[default]
    #[serde(rename = "geojson")]
    GeoJson,
    /// Cursor-on-Target event XML, for TAK-native endpoints
    #[serde(rename = "cot-xml")]
    CotXml,
}

impl std::fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedFormat::GeoJson => write!(f, "geojson"),
            FeedFormat::CotXml => write!(f, "cot-xml"),
        }
    }
}
