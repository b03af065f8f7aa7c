use serde_json::{json, Map, Value};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use unityctl_protocol::{codes, ErrorInfo, ResponseMessage};

use crate::commands::asset;
use crate::error::BridgeError;
use crate::session::ConnState;
use crate::state::AppState;

/// After `ExitingPlayMode`, how long to watch for a late
/// `compilation.started` before concluding no compilation was triggered.
/// Unity reliably emits it within this window when play-mode edits dirtied
/// scripts; a zero window would miss those.
const COMPILATION_START_WINDOW: Duration = Duration::from_secs(2);

/// `play.enter`: status short-circuit, clear logs, refresh assets, enter,
/// then watch the play-mode transition to its terminal state.
pub(crate) async fn enter(state: &AppState, deadline: Instant) -> Result<ResponseMessage, BridgeError> {
    let status = state
        .correlator
        .send_request(&state.session, "play.status", None, None, deadline)
        .await?;
    if status.is_error() {
        return Ok(status);
    }
    if is_playing(&status) {
        return Ok(ResponseMessage::ok(
            Uuid::new_v4(),
            json!({"state": "AlreadyPlaying"}),
        ));
    }
    enter_play_mode(state, deadline).await
}

/// The entry sequence proper (also run by `record.start` when the editor
/// is not yet playing): clear logs, refresh, send `play.enter`, await the
/// terminal `playModeChanged`.
pub(crate) async fn enter_play_mode(
    state: &AppState,
    deadline: Instant,
) -> Result<ResponseMessage, BridgeError> {
    state.logs.clear(Some("entered-play-mode".to_string()));

    let refreshed = asset::refresh(state, deadline, None).await?;
    if refreshed.is_error() {
        return Ok(refreshed);
    }

    let mut events = state.events.subscribe();
    let mut conn = state.session.watch_state();
    let _ = *conn.borrow_and_update();

    let ack = state
        .correlator
        .send_request(&state.session, "play.enter", None, None, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    // Terminal states: EnteredPlayMode = success; ExitingEditMode followed
    // by EnteredEditMode = the transition bounced back. A domain reload in
    // between is survived by waiting for the reconnect and re-probing.
    let mut saw_exiting_edit_mode = false;
    loop {
        tokio::select! {
            event = events.next(deadline) => {
                let event = event?;
                if event.name != "playModeChanged" {
                    continue;
                }
                match event.state() {
                    Some("EnteredPlayMode") => {
                        return Ok(ResponseMessage::ok(
                            Uuid::new_v4(),
                            json!({"state": "EnteredPlayMode"}),
                        ));
                    }
                    Some("ExitingEditMode") => saw_exiting_edit_mode = true,
                    Some("EnteredEditMode") if saw_exiting_edit_mode => {
                        return Ok(ResponseMessage::error_with_result(
                            Uuid::new_v4(),
                            ErrorInfo::new(
                                codes::PLAY_MODE_FAILED,
                                "play mode entry bounced back to edit mode",
                            ),
                            json!({"state": "PlayModeEntryFailed"}),
                        ));
                    }
                    _ => {}
                }
            }
            changed = conn.changed() => {
                if changed.is_err() {
                    return Err(BridgeError::Internal("session state channel closed".into()));
                }
                let conn_state = *conn.borrow_and_update();
                match conn_state {
                    ConnState::Disconnected { reloading: true } => {
                        state.session.wait_for_reconnect(deadline).await?;
                        let status = state
                            .correlator
                            .send_request(&state.session, "play.status", None, None, deadline)
                            .await?;
                        if status.is_error() {
                            return Ok(status);
                        }
                        if is_playing(&status) {
                            return Ok(ResponseMessage::ok(
                                Uuid::new_v4(),
                                json!({"state": "EnteredPlayMode"}),
                            ));
                        }
                        // Not playing yet: keep watching events
                    }
                    ConnState::Disconnected { reloading: false } => {
                        return Err(BridgeError::PeerDisconnected);
                    }
                    ConnState::Connected { .. } => {}
                }
            }
        }
    }
}

/// `play.exit`: send, await `ExitingPlayMode`, watch a short window for a
/// triggered compilation, survive a domain reload without failing.
pub(crate) async fn exit(state: &AppState, deadline: Instant) -> Result<ResponseMessage, BridgeError> {
    let mut events = state.events.subscribe();

    let ack = state
        .correlator
        .send_request(&state.session, "play.exit", None, None, deadline)
        .await?;
    if ack.is_error() {
        return Ok(ack);
    }

    let mut compilation_triggered = false;
    loop {
        let event = events.next(deadline).await?;
        match event.name.as_str() {
            "playModeChanged" if event.state() == Some("ExitingPlayMode") => {
                compilation_triggered = asset::bool_field(&event.payload, "compilationTriggered");
                break;
            }
            "domain.reloadStarting" => {
                state.session.wait_for_reconnect(deadline).await?;
                return Ok(exit_result(false, None));
            }
            _ => {}
        }
    }

    if !compilation_triggered {
        let window = (Instant::now() + COMPILATION_START_WINDOW).min(deadline);
        match events
            .next_match(window, |e| {
                e.name == "compilation.started" || e.name == "domain.reloadStarting"
            })
            .await
        {
            Ok(event) if event.name == "compilation.started" => compilation_triggered = true,
            Ok(_) => {
                state.session.wait_for_reconnect(deadline).await?;
                return Ok(exit_result(true, None));
            }
            Err(BridgeError::Timeout) => {}
            Err(e) => return Err(e),
        }
    }

    let mut compilation_success = None;
    if compilation_triggered {
        match events
            .next_match(deadline, |e| {
                e.name == "compilation.finished" || e.name == "domain.reloadStarting"
            })
            .await
        {
            Ok(event) if event.name == "compilation.finished" => {
                compilation_success = Some(asset::bool_field(&event.payload, "success"));
            }
            Ok(_) => {
                state.session.wait_for_reconnect(deadline).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(exit_result(compilation_triggered, compilation_success))
}

fn exit_result(compilation_triggered: bool, compilation_success: Option<bool>) -> ResponseMessage {
    let mut result = Map::new();
    result.insert("state".to_string(), json!("ExitingPlayMode"));
    result.insert(
        "compilationTriggered".to_string(),
        json!(compilation_triggered),
    );
    if let Some(success) = compilation_success {
        result.insert("compilationSuccess".to_string(), json!(success));
    }
    ResponseMessage::ok(Uuid::new_v4(), Value::Object(result))
}

pub(crate) fn is_playing(status: &ResponseMessage) -> bool {
    status
        .result
        .as_ref()
        .and_then(|r| r.get("playing"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
