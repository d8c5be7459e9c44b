//! Cursor-on-Target (CoT) XML rendering for TAK-based consumers
//!
//! Renders a [`StandardFeature`] as a CoT 2.0 `<event>` element. GeoJSON
//! stays the canonical feed shape; this encoder exists for endpoints that
//! speak CoT natively (TAK servers, ATAK gateways).

use chrono::{Duration, SecondsFormat};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::types::StandardFeature;

/// How long a rendered event stays fresh before TAK clients grey it out.
const STALE_MINUTES: i64 = 5;

/// CoT convention for "value unknown" on hae/ce/le attributes.
const UNKNOWN_VALUE: &str = "9999999.0";

#[derive(Debug, thiserror::Error)]
pub enum CotError {
    #[error("XML write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("generated CoT is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Render a feature as a self-contained CoT event document.
///
/// `time` is when the gateway saw the detection, `start` is when the source
/// claims it happened, and `stale` is `start` plus a fixed freshness window.
pub fn to_cot_xml(feature: &StandardFeature) -> Result<String, CotError> {
    let props = &feature.properties;
    let uid = format!(
        "tacfeed.{}.{}",
        props.source_id,
        props.detected_at.timestamp_millis()
    );
    let start = props.detected_at;
    let stale = start + Duration::minutes(STALE_MINUTES);

    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut event = BytesStart::new("event");
    event.push_attribute(("version", "2.0"));
    event.push_attribute(("uid", uid.as_str()));
    event.push_attribute(("type", cot_type(&props.object_class)));
    event.push_attribute(("time", rfc3339(&props.received_at).as_str()));
    event.push_attribute(("start", rfc3339(&start).as_str()));
    event.push_attribute(("stale", rfc3339(&stale).as_str()));
    event.push_attribute(("how", "m-g"));
    writer.write_event(Event::Start(event))?;

    let mut point = BytesStart::new("point");
    point.push_attribute(("lat", feature.geometry.latitude().to_string().as_str()));
    point.push_attribute(("lon", feature.geometry.longitude().to_string().as_str()));
    point.push_attribute(("hae", UNKNOWN_VALUE));
    point.push_attribute(("ce", format!("{:.1}", props.accuracy_meters).as_str()));
    point.push_attribute(("le", UNKNOWN_VALUE));
    writer.write_event(Event::Empty(point))?;

    writer.write_event(Event::Start(BytesStart::new("detail")))?;

    let mut contact = BytesStart::new("contact");
    contact.push_attribute(("callsign", props.source_id.as_str()));
    writer.write_event(Event::Empty(contact))?;

    let remarks = format!(
        "class={} confidence={:.2} flag={}{}",
        props.object_class,
        props.confidence_normalized,
        props.accuracy_flag,
        if props.requires_manual_review {
            " MANUAL_REVIEW"
        } else {
            ""
        }
    );
    writer.write_event(Event::Start(BytesStart::new("remarks")))?;
    writer.write_event(Event::Text(BytesText::new(&remarks)))?;
    writer.write_event(Event::End(BytesEnd::new("remarks")))?;

    writer.write_event(Event::End(BytesEnd::new("detail")))?;
    writer.write_event(Event::End(BytesEnd::new("event")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Map a detector object class onto a CoT atom type.
///
/// Detections carry no affiliation information, so everything lands under the
/// `a-u` (unknown) branch: `-G` ground, `-A` air.
fn cot_type(object_class: &str) -> &'static str {
    match object_class.trim().to_ascii_lowercase().as_str() {
        "vehicle" | "car" | "truck" | "boat" => "a-u-G-E-V",
        "aircraft" | "uav" | "drone" => "a-u-A",
        _ => "a-u-G",
    }
}

fn rfc3339(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
