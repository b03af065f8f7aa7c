pub mod health;
pub mod logs;
pub mod rpc;

use axum::routing::{get, post};
use axum::Router;

use crate::peer;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/rpc", post(rpc::rpc))
        .route("/logs/tail", get(logs::tail))
        .route("/logs/stream", get(logs::stream))
        .route("/logs/clear", post(logs::clear))
        // Legacy console aliases, pinned to source=console
        .route("/console/tail", get(logs::console_tail))
        .route("/console/clear", post(logs::console_clear))
        .route("/peer", get(peer::peer_upgrade))
        .with_state(state)
}
