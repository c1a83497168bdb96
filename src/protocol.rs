use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reserved method tag: the sending side is done producing on this stream
pub const COMPLETE_METHOD: &str = "complete";

/// Stream identifier
///
/// Carried on the wire as the `requestId` integer of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Outbound envelope (local side -> remote peer)
///
/// Wire format:
/// ```text
/// {"requestId": <int>, "method": "<string>", "args": <payload>}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    /// Stream identifier
    pub request_id: StreamId,

    /// Domain method name, or [`COMPLETE_METHOD`]
    pub method: String,

    /// Payload
    #[serde(default)]
    pub args: Value,
}

impl ClientMessage {
    /// Create a data envelope
    pub fn new(request_id: StreamId, method: impl Into<String>, args: Value) -> Self {
        Self {
            request_id,
            method: method.into(),
            args,
        }
    }

    /// Create a completion envelope carrying a serialized reply
    pub fn complete(request_id: StreamId, args: Value) -> Self {
        Self::new(request_id, COMPLETE_METHOD, args)
    }

    /// Check if this envelope is tagged [`COMPLETE_METHOD`]
    pub fn is_complete(&self) -> bool {
        self.method == COMPLETE_METHOD
    }

    /// Encode envelope to wire text
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode envelope from wire text
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Inbound envelope (remote peer -> local side)
///
/// Wire format:
/// ```text
/// {"requestId": <int>, "reply": <payload>, "complete": <bool>}
/// ```
///
/// `complete` may be absent; only an explicit `true` marks completion, in
/// which case `reply` holds a serialized reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Stream identifier
    pub request_id: StreamId,

    /// Data payload, or serialized reply when `complete` is true
    #[serde(default)]
    pub reply: Value,

    /// Completion marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

impl ServerMessage {
    /// Create a data envelope
    pub fn data(request_id: StreamId, reply: Value) -> Self {
        Self {
            request_id,
            reply,
            complete: Some(false),
        }
    }

    /// Create a completion envelope
    pub fn completion(request_id: StreamId, reply: Value) -> Self {
        Self {
            request_id,
            reply,
            complete: Some(true),
        }
    }

    /// Check if the completion marker is set
    pub fn is_complete(&self) -> bool {
        self.complete == Some(true)
    }

    /// Encode envelope to wire text
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode envelope from wire text
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
