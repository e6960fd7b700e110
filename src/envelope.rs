//! Decoding of raw delivery payloads into typed envelopes.

use serde_json::{Map, Value};
use thiserror::Error;

/// Type tag used when a payload carries no usable `type` field.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

const UNKNOWN_META: &str = "unknown";

/// Provenance fields carried in the optional `_meta` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub producer: String,
    pub message_id: String,
    pub correlation_id: String,
}

impl Default for EventMeta {
    fn default() -> Self {
        Self {
            producer: UNKNOWN_META.to_string(),
            message_id: UNKNOWN_META.to_string(),
            correlation_id: UNKNOWN_META.to_string(),
        }
    }
}

impl EventMeta {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(meta)) = value else {
            return Self::default();
        };
        let field = |key: &str| {
            meta.get(key)
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_META)
                .to_string()
        };
        Self {
            producer: field("producer"),
            message_id: field("message_id"),
            correlation_id: field("correlation_id"),
        }
    }
}

/// One decoded inbound message. Handlers only ever borrow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    event_type: String,
    meta: EventMeta,
    body: Map<String, Value>,
}

impl Envelope {
    /// The type tag used for dispatch.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    /// The complete decoded object, `type` and `_meta` included.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Numeric field, `0.0` when absent or not a number.
    pub fn number_or_zero(&self, key: &str) -> f64 {
        self.body.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Array field, empty when absent or not an array.
    pub fn array_or_empty(&self, key: &str) -> &[Value] {
        self.body
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Why a payload could not be turned into an [`Envelope`].
///
/// Every variant is permanent: the same bytes fail the same way on redelivery.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid UTF-8 JSON.
    #[error("malformed JSON payload: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("payload is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

impl DecodeError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, DecodeError::Syntax(_))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a raw delivery body.
///
/// Only the `type` tag and `_meta` provenance are extracted here; business
/// fields are left to the handlers.
pub fn decode(raw: &[u8]) -> Result<Envelope, DecodeError> {
    let body = match serde_json::from_slice::<Value>(raw)? {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let event_type = body
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TYPE)
        .to_string();
    let meta = EventMeta::from_value(body.get("_meta"));

    Ok(Envelope {
        event_type,
        meta,
        body,
    })
}

#[cfg(test)]
pub(crate) fn envelope_from(value: Value) -> Envelope {
    decode(value.to_string().as_bytes()).expect("test envelope must decode")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_extracts_type_and_meta() {
        let raw = br#"{"type":"ORDER_CREATED","order_id":"o-1","_meta":{"producer":"python","message_id":"m-1","correlation_id":"msg-000001"}}"#;
        let envelope = decode(raw).unwrap();

        assert_eq!(envelope.event_type(), "ORDER_CREATED");
        assert_eq!(envelope.meta().producer, "python");
        assert_eq!(envelope.meta().message_id, "m-1");
        assert_eq!(envelope.meta().correlation_id, "msg-000001");
        assert_eq!(envelope.str_field("order_id"), Some("o-1"));
    }

    #[test]
    fn test_decode_defaults_missing_type_and_meta() {
        let envelope = decode(br#"{"order_id":"o-1"}"#).unwrap();
        assert_eq!(envelope.event_type(), UNKNOWN_TYPE);
        assert_eq!(envelope.meta(), &EventMeta::default());
    }

    #[test]
    fn test_decode_empty_or_non_string_type_is_unknown() {
        assert_eq!(decode(br#"{"type":""}"#).unwrap().event_type(), UNKNOWN_TYPE);
        assert_eq!(decode(br#"{"type":42}"#).unwrap().event_type(), UNKNOWN_TYPE);
    }

    #[test]
    fn test_decode_partial_meta_defaults_each_field() {
        let envelope = decode(br#"{"type":"X","_meta":{"producer":"go","message_id":7}}"#).unwrap();
        assert_eq!(envelope.meta().producer, "go");
        assert_eq!(envelope.meta().message_id, "unknown");
        assert_eq!(envelope.meta().correlation_id, "unknown");
    }

    #[test]
    fn test_decode_malformed_is_syntax_error() {
        let err = decode(b"{not json").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_decode_invalid_utf8_is_syntax_error() {
        let err = decode(&[b'"', 0xff, 0xfe, b'"']).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_decode_non_object_is_rejected() {
        let err = decode(b"[1,2,3]").unwrap_err();
        assert!(!err.is_syntax());
        assert_eq!(err.to_string(), "payload is a JSON array, expected an object");
    }

    #[test]
    fn test_field_accessors_default() {
        let envelope = envelope_from(json!({"type": "X", "total": "oops", "items": {}}));
        assert_eq!(envelope.number_or_zero("total"), 0.0);
        assert_eq!(envelope.number_or_zero("missing"), 0.0);
        assert!(envelope.array_or_empty("items").is_empty());
        assert!(envelope.has_field("type"));
    }
}
