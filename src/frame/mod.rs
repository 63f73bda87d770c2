//! # Frame extraction and classification
//!
//! MeshCom nodes print their traffic on the serial console as JSON objects, but the
//! lines are loosely framed: firmware log prefixes, ANSI noise or trailing garbage
//! can surround the payload. [`extract_frame`] recovers the object by taking the span
//! from the first `{` to the last `}` of the line and parsing only that.
//!
//! The span rule is deliberately not a balanced-bracket scan, so nested objects in
//! the payload survive intact:
//!
//! ```rust
//! use meshcom_gateway::frame::extract_frame;
//!
//! let frame = extract_frame(r#"rx: {"type":"tele","env":{"t":21}} ok"#).unwrap();
//! assert_eq!(frame["env"]["t"], 21);
//! assert!(extract_frame("no payload here").is_none());
//! ```
//!
//! Well-known frame types (as emitted by MeshCom firmware):
//!
//! - `msg` - text message (`src`, `dst`, `msg`)
//! - `pos` - position report (`lat`, `lat_dir`, `long`, `long_dir`, ...)
//! - `tele` - telemetry key/value pairs

pub mod processor;

use serde_json::{Map, Value};

/// One decoded device record: field name to JSON value, in arrival order.
pub type Frame = Map<String, Value>;

/// Classification used when a frame carries no usable `type`.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Pull the outermost JSON object out of a raw serial line.
///
/// Returns `None` when the line has no `{`, no later `}`, or the span between them
/// does not parse as a JSON object. Noise is expected on the link, so none of
/// these cases is an error.
pub fn extract_frame(line: &str) -> Option<Frame> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&line[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Table name for a frame: its `type` rendered as text, or [`UNKNOWN_TYPE`] when
/// absent, null or empty.
pub fn frame_type(frame: &Frame) -> String {
    match frame.get("type") {
        None | Some(Value::Null) => UNKNOWN_TYPE.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNKNOWN_TYPE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn text_field<'a>(frame: &'a Frame, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    match frame.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(std::borrow::Cow::Borrowed(s.as_str())),
        other => Some(std::borrow::Cow::Owned(other.to_string())),
    }
}

fn field_or<'a>(frame: &'a Frame, key: &str, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    text_field(frame, key).unwrap_or(std::borrow::Cow::Borrowed(fallback))
}

/// One-line human summary of a stored frame for the gateway log.
pub fn summarize(kind: &str, frame: &Frame) -> String {
    let src = field_or(frame, "src", "?");
    let short: String = kind.chars().take(3).collect();
    match kind {
        "msg" => {
            let text = text_field(frame, "msg")
                .or_else(|| text_field(frame, "text"))
                .or_else(|| text_field(frame, "message"))
                .unwrap_or_default();
            format!(
                "{} | DST: {} | SRC: {} | TEXT: {}",
                short,
                field_or(frame, "dst", "?"),
                src,
                text
            )
        }
        "pos" => format!(
            "{} | NODE: {} | LAT: {} {} | LON: {} {}",
            short,
            src,
            field_or(frame, "lat", "?"),
            field_or(frame, "lat_dir", "?"),
            field_or(frame, "long", "?"),
            field_or(frame, "long_dir", "?")
        ),
        "tele" => {
            let pairs = frame
                .iter()
                .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "time")
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("{}: {}", k.to_uppercase(), value)
                })
                .collect::<Vec<_>>();
            format!("{} | {}", short, pairs.join(" | "))
        }
        _ => format!("{} | SRC: {}", short, src),
    }
}
