//! Request/response envelope and its canonical JSON codec

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Status, PROTOCOL_VERSION};

/// Structured request/response unit exchanged over the link
///
/// `id` is an opaque token chosen by the client; it and `msg_type` are
/// echoed on every response to the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: i64,
    pub id: Value,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Build a request envelope at the current protocol version
    pub fn request(id: impl Into<Value>, msg_type: &str, data: Option<Value>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id: id.into(),
            msg_type: msg_type.to_string(),
            status: Status::Success,
            data,
        }
    }

    pub fn header(&self) -> RequestHeader {
        RequestHeader {
            id: self.id.clone(),
            msg_type: self.msg_type.clone(),
        }
    }
}

/// The part of a request every response must echo
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHeader {
    pub id: Value,
    pub msg_type: String,
}

impl RequestHeader {
    /// Response envelope for this request, stamped with our protocol version
    pub fn response(&self, status: Status, data: Option<Value>) -> Envelope {
        Envelope {
            version: PROTOCOL_VERSION,
            id: self.id.clone(),
            msg_type: self.msg_type.clone(),
            status,
            data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ends before the JSON document does; more fragments may follow
    #[error("incomplete message ({0} bytes buffered)")]
    Incomplete(usize),
    /// Not JSON (yet); trailing or interleaved garbage
    #[error("invalid JSON: {0}")]
    Syntax(serde_json::Error),
    /// A complete JSON document that is not a valid envelope
    #[error("malformed envelope: {0}")]
    Malformed(serde_json::Error),
}

impl DecodeError {
    /// Whether waiting for further input could still produce an envelope
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::Malformed(_))
    }
}

/// Parse a complete envelope
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    use serde_json::error::Category;

    serde_json::from_slice(bytes).map_err(|e| match e.classify() {
        Category::Eof => DecodeError::Incomplete(bytes.len()),
        Category::Data => DecodeError::Malformed(e),
        Category::Syntax | Category::Io => DecodeError::Syntax(e),
    })
}

/// Serialize with no insignificant whitespace; `data` is omitted when absent
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    // Envelope holds only strings, integers and JSON values, none of which
    // can fail to serialize.
    serde_json::to_vec(envelope).unwrap_or_default()
}
