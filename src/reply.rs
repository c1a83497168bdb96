//! Terminal result of a stream.
//!
//! Every stream ends with exactly one [`Reply`]: a success payload or a
//! failure [`Status`]. On the wire a reply travels as a [`SerializedReply`]
//! object, both in the inbound completion envelope and in the `args` of an
//! outbound `complete` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Generic failure code
pub const STATUS_ERR: &str = "err";

/// Code used when a stream is cancelled locally
pub const STATUS_CANCELLED: &str = "cancelled";

/// Code used when an inbound completion carried an unreadable reply
pub const STATUS_MALFORMED: &str = "malformed";

/// Failure status with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: String,
    pub message: String,
}

impl Status {
    /// Create a status from a code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Terminal result
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok(Value),
    Err(Status),
}

/// Failure reply with the generic [`STATUS_ERR`] code
pub fn err_status(message: impl Into<String>) -> Reply {
    Reply::Err(Status::new(STATUS_ERR, message))
}

/// Wire form of a [`Reply`]
///
/// ```text
/// {"ok": true, "value": <payload>}
/// {"ok": false, "status": "<code>", "message": "<text>"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Reply {
    /// Success reply carrying `value`
    pub fn ok(value: Value) -> Self {
        Reply::Ok(value)
    }

    /// Check if this is a success
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// Check if this is a failure
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Success payload, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            Reply::Ok(v) => Some(v),
            Reply::Err(_) => None,
        }
    }

    /// Failure status, if any
    pub fn status(&self) -> Option<&Status> {
        match self {
            Reply::Ok(_) => None,
            Reply::Err(s) => Some(s),
        }
    }

    /// Convert to the wire struct; a null success value is omitted
    pub fn to_serialized_reply(&self) -> SerializedReply {
        match self {
            Reply::Ok(value) => SerializedReply {
                ok: true,
                value: (!value.is_null()).then(|| value.clone()),
                status: None,
                message: None,
            },
            Reply::Err(status) => SerializedReply {
                ok: false,
                value: None,
                status: Some(status.code.clone()),
                message: Some(status.message.clone()),
            },
        }
    }

    /// Rebuild from the wire struct, defaulting a missing failure code to [`STATUS_ERR`]
    pub fn from_serialized_reply(reply: SerializedReply) -> Self {
        if reply.ok {
            Reply::Ok(reply.value.unwrap_or(Value::Null))
        } else {
            Reply::Err(Status::new(
                reply.status.unwrap_or_else(|| STATUS_ERR.to_string()),
                reply.message.unwrap_or_default(),
            ))
        }
    }

    /// Serialized reply as a JSON value, ready to be placed in an envelope
    pub fn to_wire(&self) -> Value {
        // SerializedReply holds only strings, bools and JSON values
        serde_json::to_value(self.to_serialized_reply())
            .unwrap_or(Value::Null)
    }

    /// Rebuild a reply from the `reply` field of a completion envelope
    pub fn from_wire(wire: &Value) -> Result<Self, serde_json::Error> {
        SerializedReply::deserialize(wire)
            .map(Self::from_serialized_reply)
    }
}

impl From<Status> for Reply {
    fn from(status: Status) -> Self {
        Reply::Err(status)
    }
}
