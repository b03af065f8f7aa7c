use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use unityctl_protocol::ResponseMessage;

use crate::commands;
use crate::error::BridgeError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub command: String,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Seconds; overrides the per-command default deadline.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// `POST /rpc` — the body mirrors the peer request shape, the response
/// mirrors the peer response shape one-for-one. Transport failures
/// (no peer, timeout, disconnect) become HTTP status codes instead.
pub async fn rpc(
    State(state): State<AppState>,
    Json(body): Json<RpcRequest>,
) -> Result<Json<ResponseMessage>, BridgeError> {
    let response =
        commands::dispatch(&state, &body.command, body.args, body.agent_id, body.timeout).await?;
    Ok(Json(response))
}
