use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub project_id: String,
    pub unity_connected: bool,
    pub editor_ready: bool,
    pub bridge_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unity_plugin_version: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        project_id: state.project.id.clone(),
        unity_connected: state.session.connected(),
        editor_ready: state.session.editor_ready(),
        bridge_version: env!("CARGO_PKG_VERSION"),
        unity_plugin_version: state.session.hello().map(|h| h.plugin_version),
    })
}
