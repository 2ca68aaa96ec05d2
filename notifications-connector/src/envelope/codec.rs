//! Inbound envelope decoding.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::DecodeError;
use crate::utils::{parse_timestamp, Timestamp};

/// Key of the tenant identifier inside the envelope `data`.
pub const ORG_ID_KEY: &str = "org_id";

/// Correlation id used when none can be read from a malformed envelope.
pub const UNKNOWN_ID: &str = "unknown";

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The correlation id, echoed in the outbound result.
    pub id: String,
    /// The event type.
    pub event_type: String,
    /// The producer of the event, if present.
    pub source: Option<String>,
    /// The event time, if present and parseable.
    pub time: Option<Timestamp>,
    /// The event payload.
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Returns the tenant identifier carried in `data`.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        self.data.get(ORG_ID_KEY).and_then(Value::as_str)
    }

    /// Returns the `data` attribute as a JSON value.
    #[must_use]
    pub fn data_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// `data` is an object, or a string holding an encoded object for older
/// producers. Structured parsing is attempted first.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireData {
    Structured(Map<String, Value>),
    Encoded(String),
}

impl WireData {
    fn into_object(self) -> Result<Map<String, Value>, DecodeError> {
        match self {
            Self::Structured(map) => Ok(map),
            Self::Encoded(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(DecodeError::InvalidData(format!(
                    "encoded data must be an object, got {}",
                    json_kind(&other)
                ))),
                Err(e) => Err(DecodeError::InvalidData(e.to_string())),
            },
        }
    }
}

/// Decodes a raw inbound body.
///
/// `id`, `type` and `data` are required. `source` and `time` are optional;
/// a `time` that cannot be parsed is ignored.
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let id = required_string(&object, "id")?;
    let event_type = required_string(&object, "type")?;
    let source = object.get("source").and_then(Value::as_str).map(str::to_string);
    let time = object
        .get("time")
        .and_then(Value::as_str)
        .and_then(|raw| parse_timestamp(raw).ok());

    let data = object
        .remove("data")
        .ok_or(DecodeError::MissingAttribute("data"))?;
    let data = serde_json::from_value::<WireData>(data)
        .map_err(|_| DecodeError::InvalidData("expected an object or an encoded object".to_string()))?
        .into_object()?;

    Ok(Envelope {
        id,
        event_type,
        source,
        time,
        data,
    })
}

/// Reads the `id` of an envelope that failed to decode, if possible.
#[must_use]
pub fn salvage_id(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn required_string(object: &Map<String, Value>, key: &'static str) -> Result<String, DecodeError> {
    match object.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DecodeError::MissingAttribute(key)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
