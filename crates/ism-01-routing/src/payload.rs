//! Outbound payload serialization.
//!
//! Publish and request accept raw bytes (passed through untouched),
//! strings (UTF-8 bytes) and JSON-encodable values. Serialization
//! failures surface as [`TransportError::Encode`] before any network I/O.

use crate::errors::TransportError;
use serde_json::Value;
use shared_types::Data;

/// A message body accepted by the transport.
#[derive(Debug, Clone)]
pub enum MessagePayload {
    /// Raw bytes, passed through as-is.
    Bytes(Vec<u8>),
    /// Text, sent as its UTF-8 bytes.
    Text(String),
    /// Any JSON value, encoded with `serde_json`.
    Json(Value),
}

impl MessagePayload {
    /// Serializes the payload to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            MessagePayload::Bytes(data) => Ok(data.clone()),
            MessagePayload::Text(text) => Ok(text.clone().into_bytes()),
            MessagePayload::Json(value) => {
                serde_json::to_vec(value).map_err(|e| TransportError::Encode(e.to_string()))
            }
        }
    }
}

impl From<Vec<u8>> for MessagePayload {
    fn from(data: Vec<u8>) -> Self {
        MessagePayload::Bytes(data)
    }
}

impl From<&[u8]> for MessagePayload {
    fn from(data: &[u8]) -> Self {
        MessagePayload::Bytes(data.to_vec())
    }
}

impl From<String> for MessagePayload {
    fn from(text: String) -> Self {
        MessagePayload::Text(text)
    }
}

impl From<&str> for MessagePayload {
    fn from(text: &str) -> Self {
        MessagePayload::Text(text.to_string())
    }
}

impl From<Value> for MessagePayload {
    fn from(value: Value) -> Self {
        MessagePayload::Json(value)
    }
}

impl From<Data> for MessagePayload {
    fn from(data: Data) -> Self {
        MessagePayload::Json(Value::Object(data))
    }
}
