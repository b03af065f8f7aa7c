use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Frames exchanged with the editor peer over the WebSocket.
/// All frames are JSON text, discriminated by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Hello(HelloMessage),
    Request(RequestMessage),
    Response(ResponseMessage),
    Event(EventMessage),
}

/// First frame of a peer session, sent exactly once after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessage {
    pub project_id: String,
    pub unity_version: String,
    pub protocol_version: String,
    pub plugin_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// A command forwarded from the bridge to the editor peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub id: Uuid,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// One response per request, matched by `id`. The same shape is returned
/// verbatim to HTTP callers of `/rpc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub id: Uuid,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ResponseMessage {
    pub fn ok(id: Uuid, result: Value) -> Self {
        Self {
            id,
            status: ResponseStatus::Ok,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Uuid, error: ErrorInfo) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            result: None,
            error: Some(error),
        }
    }

    /// An error response that also carries a result payload (compound
    /// command failures attach the observed compiler output this way).
    pub fn error_with_result(id: Uuid, error: ErrorInfo, result: Value) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            result: Some(result),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// Unsolicited notification from the peer (log lines, play-mode
/// transitions, compilation progress, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub name: String,
    pub payload: Value,
}

impl EventMessage {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The `state` field of the payload, present on `playModeChanged`.
    pub fn state(&self) -> Option<&str> {
        self.payload.get("state").and_then(Value::as_str)
    }
}
