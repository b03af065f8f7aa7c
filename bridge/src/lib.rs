//! The unityctl bridge daemon: mediates between short-lived HTTP callers
//! (the CLI) and the long-lived editor peer connected over a WebSocket.
//! Owns request correlation with deadlines, the unified log pipeline, the
//! compound command orchestration, and the domain-reload grace protocol.

pub mod commands;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod logs;
pub mod peer;
pub mod routes;
pub mod session;
pub mod state;
pub mod tailer;

pub use config::BridgeConfig;
pub use routes::build_router;
pub use state::AppState;
