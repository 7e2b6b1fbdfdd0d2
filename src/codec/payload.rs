//! Payload normalization
//!
//! `Payload` is what callers hand to the publisher; `DecodedPayload` is what
//! a subscriber handler receives. The decode path is an ordered chain of
//! fallible conversions (bytes -> text -> JSON) where each step only falls
//! back to the representation produced by the previous step.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::error::{PubSubError, Result};

/// An application-level value to be published.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, passed through untouched.
    Bytes(Vec<u8>),
    /// Text, encoded as UTF-8.
    Text(String),
    /// Key/value data, serialized as a JSON object.
    Structured(Value),
}

impl Payload {
    /// Builds a structured payload from any serializable value.
    ///
    /// The value still has to serialize to a JSON object for [`encode`] to
    /// accept it.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Payload::Structured)
            .map_err(|e| PubSubError::UnsupportedPayloadType(e.to_string()))
    }

    /// Short name of the payload kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Structured(value) => json_kind(value),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload::Structured(Value::Object(map))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

/// A delivered payload after best-effort decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedPayload {
    /// The bytes were not valid UTF-8.
    Bytes(Vec<u8>),
    /// Valid UTF-8 that is not valid JSON.
    Text(String),
    /// Valid JSON.
    Structured(Value),
}

impl DecodedPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            DecodedPayload::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedPayload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Converts a payload into the bytes handed to the transport.
///
/// Fails with [`PubSubError::UnsupportedPayloadType`] for structured values
/// that are not JSON objects. This check runs before any transport call.
pub fn encode(payload: Payload) -> Result<Vec<u8>> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes),
        Payload::Text(text) => Ok(text.into_bytes()),
        Payload::Structured(value @ Value::Object(_)) => serde_json::to_vec(&value)
            .map_err(|e| PubSubError::UnsupportedPayloadType(e.to_string())),
        Payload::Structured(other) => Err(PubSubError::UnsupportedPayloadType(format!(
            "expected bytes, text or a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Decodes delivered bytes. Never fails.
pub fn decode(bytes: &[u8]) -> DecodedPayload {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return DecodedPayload::Bytes(bytes.to_vec()),
    };

    match serde_json::from_str::<Value>(text) {
        Ok(value) => DecodedPayload::Structured(value),
        Err(_) => DecodedPayload::Text(text.to_string()),
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
