use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use unityctl_protocol::ResponseMessage;

use crate::commands::{duration_arg, play};
use crate::error::BridgeError;
use crate::state::AppState;

/// `record.start`: the editor must be in play mode to record, so this
/// runs the play-entry sequence first when it is not. With a `duration`
/// arg the flow blocks until the recording finishes; without one it
/// returns the acknowledgement and the caller stops explicitly.
pub(crate) async fn start(
    state: &AppState,
    args: Option<Value>,
    agent_id: Option<String>,
    deadline: Instant,
) -> Result<ResponseMessage, BridgeError> {
    let status = state
        .correlator
        .send_request(&state.session, "play.status", None, None, deadline)
        .await?;
    if status.is_error() {
        return Ok(status);
    }
    if !play::is_playing(&status) {
        let entered = play::enter_play_mode(state, deadline).await?;
        if entered.is_error() {
            return Ok(entered);
        }
    }

    let mut events = state.events.subscribe();

    let ack = state
        .correlator
        .send_request(&state.session, "record.start", args.clone(), agent_id, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    if duration_arg(args.as_ref()).is_none() {
        return Ok(ack);
    }

    let recording_id = ack
        .result
        .as_ref()
        .and_then(|r| r.get("recordingId"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let finished = events
        .next_match(deadline, |e| {
            e.name == "record.finished"
                && match &recording_id {
                    Some(id) => e.payload.get("recordingId").and_then(Value::as_str) == Some(id),
                    None => true,
                }
        })
        .await?;
    Ok(ResponseMessage::ok(Uuid::new_v4(), finished.payload))
}

/// `test.run`: the peer acks with `{started, testRunId}` and the verdict
/// arrives later as `test.finished`, returned to the caller unchanged.
pub(crate) async fn test_run(
    state: &AppState,
    args: Option<Value>,
    agent_id: Option<String>,
    deadline: Instant,
) -> Result<ResponseMessage, BridgeError> {
    let mut events = state.events.subscribe();

    let ack = state
        .correlator
        .send_request(&state.session, "test.run", args, agent_id, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    let test_run_id = ack
        .result
        .as_ref()
        .and_then(|r| r.get("testRunId"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let finished = events
        .next_match(deadline, |e| {
            e.name == "test.finished"
                && match &test_run_id {
                    Some(id) => e.payload.get("testRunId").and_then(Value::as_str) == Some(id),
                    None => true,
                }
        })
        .await?;
    Ok(ResponseMessage::ok(Uuid::new_v4(), finished.payload))
}
