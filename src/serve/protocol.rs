//! Request-loop wire types
//!
//! One JSON object per line in each direction:
//! - request: `{"id", "op", "serial"?, "params"?}`
//! - response: `{"id", "ok", "result"?, "error"?: {"code", "message"}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LaneError;

/// Error code for lines that are not a valid request
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Error code for an unrecognized `op`
pub const UNKNOWN_OP: &str = "UNKNOWN_OP";

/// Error code for params that do not fit the op
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";

/// Operations the request loop accepts
pub const OPS: &[&str] = &[
    "list_devices",
    "device_status",
    "list_active_sessions",
    "session_snapshots",
    "clear_session",
    "shell",
    "tap",
    "swipe",
    "send_text",
    "system_action",
    "click_element",
    "ui_info",
];

/// One request line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed back verbatim
    #[serde(default)]
    pub id: Value,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Parse one line
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response
    pub fn failure(id: Value, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Failed response carrying a lane error's code and message
    pub fn from_error(id: Value, err: &LaneError) -> Self {
        Self::failure(id, err.code(), err.to_string())
    }

    /// Serialize as a single line (no trailing newline)
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "id": null,
                "ok": false,
                "error": {
                    "code": "INTERNAL",
                    "message": format!("response encoding failed: {}", e),
                },
            })
            .to_string()
        })
    }
}
