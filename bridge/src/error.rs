use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use unityctl_protocol::codes;

/// Transport-level failures the bridge itself originates. Peer-reported
/// errors and compound-flow failures (`COMPILATION_ERROR`,
/// `PLAY_MODE_FAILED`) are not in here: those travel inside a
/// `ResponseMessage` with HTTP 200.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no editor peer connected")]
    PeerUnavailable,

    #[error("request deadline exceeded")]
    Timeout,

    #[error("editor peer disconnected")]
    PeerDisconnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable error code string for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PeerUnavailable => codes::PEER_UNAVAILABLE,
            Self::Timeout => codes::TIMEOUT,
            Self::PeerDisconnected => codes::PEER_DISCONNECTED,
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::PeerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::PeerDisconnected => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
