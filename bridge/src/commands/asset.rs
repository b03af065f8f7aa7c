use serde_json::{json, Value};
use tokio::time::Instant;
use uuid::Uuid;

use unityctl_protocol::{codes, ErrorInfo, ResponseMessage};

use crate::error::BridgeError;
use crate::state::AppState;

/// How many pre-existing console errors get attached when a refresh finds
/// the project already broken.
const EXISTING_ERROR_LIMIT: usize = 50;

/// The `asset.refresh` flow: the peer's reply is only an acknowledgement;
/// the real outcome arrives as events. `clear_reason` is set for a bare
/// refresh RPC and None when a play-mode flow already cleared the logs.
pub(crate) async fn refresh(
    state: &AppState,
    deadline: Instant,
    clear_reason: Option<&str>,
) -> Result<ResponseMessage, BridgeError> {
    if let Some(reason) = clear_reason {
        state.logs.clear(Some(reason.to_string()));
    }

    // Subscribe before sending so the completion event cannot slip past
    // between ack and wait.
    let mut events = state.events.subscribe();

    let ack = state
        .correlator
        .send_request(&state.session, "asset.refresh", None, None, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    let complete = events.next_named(deadline, "asset.refreshComplete").await?;
    let compilation_triggered = bool_field(&complete.payload, "compilationTriggered");
    let has_existing_errors = bool_field(&complete.payload, "hasCompilationErrors");

    if has_existing_errors {
        let errors: Vec<Value> = state
            .logs
            .recent_errors(EXISTING_ERROR_LIMIT)
            .into_iter()
            .map(|entry| {
                json!({
                    "message": entry.message,
                    "stackTrace": entry.stack_trace,
                })
            })
            .collect();
        return Ok(ResponseMessage::error_with_result(
            Uuid::new_v4(),
            ErrorInfo::new(
                codes::COMPILATION_ERROR,
                "project has pre-existing compilation errors",
            ),
            json!({
                "compilationTriggered": compilation_triggered,
                "compilationSuccess": false,
                "errors": errors,
                "warnings": [],
            }),
        ));
    }

    if !compilation_triggered {
        return Ok(ResponseMessage::ok(
            Uuid::new_v4(),
            json!({
                "compilationTriggered": false,
                "compilationSuccess": true,
            }),
        ));
    }

    let finished = events.next_named(deadline, "compilation.finished").await?;
    let success = bool_field(&finished.payload, "success");
    let errors = finished
        .payload
        .get("errors")
        .cloned()
        .unwrap_or_else(|| json!([]));
    let warnings = finished
        .payload
        .get("warnings")
        .cloned()
        .unwrap_or_else(|| json!([]));

    let result = json!({
        "compilationTriggered": true,
        "compilationSuccess": success,
        "errors": errors,
        "warnings": warnings,
    });
    if success {
        Ok(ResponseMessage::ok(Uuid::new_v4(), result))
    } else {
        Ok(ResponseMessage::error_with_result(
            Uuid::new_v4(),
            ErrorInfo::new(codes::COMPILATION_ERROR, "compilation failed"),
            result,
        ))
    }
}

/// Forward a command whose completion is only signalled by an event
/// (`asset.import`, `asset.reimportAll`): ack first, then return the
/// completion payload.
pub(crate) async fn forward_and_await(
    state: &AppState,
    command: &str,
    completion_event: &str,
    args: Option<Value>,
    agent_id: Option<String>,
    deadline: Instant,
) -> Result<ResponseMessage, BridgeError> {
    let mut events = state.events.subscribe();

    let ack = state
        .correlator
        .send_request(&state.session, command, args, agent_id, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    let done = events.next_named(deadline, completion_event).await?;
    Ok(ResponseMessage::ok(Uuid::new_v4(), done.payload))
}

pub(crate) fn bool_field(payload: &Value, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}
