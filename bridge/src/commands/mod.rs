mod asset;
mod play;
mod record;

use serde_json::Value;
use tokio::time::{Duration, Instant};

use unityctl_protocol::ResponseMessage;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::state::AppState;

/// Execute a caller-visible command: compound commands expand into their
/// multi-step flows here; everything else is forwarded to the peer
/// verbatim. `timeout_override` (seconds) comes from the RPC body and
/// wins over the per-command table.
pub async fn dispatch(
    state: &AppState,
    command: &str,
    args: Option<Value>,
    agent_id: Option<String>,
    timeout_override: Option<u64>,
) -> Result<ResponseMessage, BridgeError> {
    let secs =
        timeout_override.unwrap_or_else(|| command_timeout_secs(&state.config, command, args.as_ref()));
    let deadline = Instant::now() + Duration::from_secs(secs);

    match command {
        "asset.refresh" => asset::refresh(state, deadline, Some("asset-refresh")).await,
        "asset.import" => {
            asset::forward_and_await(state, command, "asset.importComplete", args, agent_id, deadline)
                .await
        }
        "asset.reimportAll" => {
            asset::forward_and_await(
                state,
                command,
                "asset.reimportAllComplete",
                args,
                agent_id,
                deadline,
            )
            .await
        }
        "play.enter" => play::enter(state, deadline).await,
        "play.exit" => play::exit(state, deadline).await,
        "test.run" => record::test_run(state, args, agent_id, deadline).await,
        "record.start" => record::start(state, args, agent_id, deadline).await,
        _ => {
            state
                .correlator
                .send_request(&state.session, command, args, agent_id, deadline)
                .await
        }
    }
}

/// Default logical deadline per command, in seconds.
pub fn command_timeout_secs(config: &BridgeConfig, command: &str, args: Option<&Value>) -> u64 {
    match command {
        "asset.refresh" => config.timeout_refresh,
        "test.run" => config.timeout_test,
        "build.player" => config.timeout_build,
        "record.start" | "record.stop" => duration_arg(args)
            .map(|duration| duration + 60)
            .unwrap_or(config.timeout_default),
        _ => config.timeout_default,
    }
}

/// The `duration` arg of record commands, rounded up to whole seconds.
pub(crate) fn duration_arg(args: Option<&Value>) -> Option<u64> {
    args?.get("duration")?.as_f64().map(|d| d.ceil() as u64)
}
