use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use unityctl_protocol::{EventMessage, HelloMessage, LogLevel, LogSource, WireMessage};

use crate::session::Disconnect;
use crate::state::AppState;

/// How long a freshly connected peer has to send its hello frame.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for the `editor.ping` readiness probe after connect.
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket close code for protocol violations (bad hello, wrong project).
const POLICY_VIOLATION: u16 = 1008;

/// `GET /peer` — the single WebSocket endpoint for the editor plugin.
pub async fn peer_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_peer(state, socket))
}

async fn handle_peer(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let hello = match await_hello(&mut stream).await {
        Ok(hello) => hello,
        Err(reason) => {
            tracing::warn!("peer handshake failed: {}", reason);
            close_policy_violation(&mut sink, reason).await;
            return;
        }
    };

    if hello.project_id != state.project.id {
        tracing::warn!(
            "peer hello for project {} but this bridge serves {}",
            hello.project_id,
            state.project.id
        );
        close_policy_violation(&mut sink, "projectId mismatch".to_string()).await;
        return;
    }

    // Single-writer rule: everything outbound goes through this channel
    // and exactly one task touches the sink.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WireMessage>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let generation = state.session.install_peer(hello.clone(), outbound_tx);
    tracing::info!(
        unity_version = %hello.unity_version,
        plugin_version = %hello.plugin_version,
        generation,
        "editor peer connected"
    );

    spawn_readiness_probe(state.clone(), generation);

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => dispatch_frame(&state, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }

    match state.session.peer_lost(generation) {
        Disconnect::Replaced => {
            tracing::debug!(generation, "replaced peer reader exited");
        }
        Disconnect::Dropped => {
            let failed = state.correlator.fail_all_disconnected();
            tracing::warn!(
                failed,
                "editor peer disconnected without domain reload; failed in-flight requests"
            );
        }
        Disconnect::Reloading => {
            tracing::info!("editor peer disconnected for domain reload; holding in-flight requests");
            spawn_reload_grace_timer(state.clone());
        }
    }
    writer.abort();
}

async fn await_hello(stream: &mut SplitStream<WebSocket>) -> Result<HelloMessage, String> {
    let deadline = Instant::now() + HELLO_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let frame = match tokio::time::timeout(remaining, stream.next()).await {
            Err(_) => return Err("no hello frame within handshake deadline".to_string()),
            Ok(None) => return Err("socket closed before hello".to_string()),
            Ok(Some(Err(e))) => return Err(format!("socket error before hello: {}", e)),
            Ok(Some(Ok(frame))) => frame,
        };
        match frame {
            Message::Text(text) => {
                return match serde_json::from_str::<WireMessage>(&text) {
                    Ok(WireMessage::Hello(hello)) => Ok(hello),
                    Ok(_) => Err("first frame was not hello".to_string()),
                    Err(e) => Err(format!("malformed hello frame: {}", e)),
                };
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err("peer closed during handshake".to_string()),
            Message::Binary(_) => return Err("binary frame before hello".to_string()),
        }
    }
}

async fn close_policy_violation(sink: &mut SplitSink<WebSocket, Message>, reason: String) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: POLICY_VIOLATION,
            reason: reason.into(),
        })))
        .await;
}

fn dispatch_frame(state: &AppState, text: &str) {
    let frame: WireMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("malformed peer frame: {}", e);
            return;
        }
    };
    match frame {
        WireMessage::Response(response) => {
            if !state.correlator.resolve(response) {
                tracing::debug!("response with no pending request (caller likely timed out)");
            }
        }
        WireMessage::Event(event) => handle_event(state, event),
        WireMessage::Hello(_) => tracing::warn!("duplicate hello frame; ignoring"),
        WireMessage::Request(_) => tracing::warn!("peer sent a request frame; ignoring"),
    }
}

fn handle_event(state: &AppState, event: EventMessage) {
    match event.name.as_str() {
        "log" => {
            let payload = &event.payload;
            let level = payload
                .get("level")
                .and_then(|v| serde_json::from_value::<LogLevel>(v.clone()).ok())
                .unwrap_or_default();
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let stack_trace = payload
                .get("stackTrace")
                .and_then(Value::as_str)
                .map(str::to_string);
            let color = payload.get("color").and_then(Value::as_str).map(str::to_string);
            state
                .logs
                .push(LogSource::Console, level, message, stack_trace, color);
        }
        "domain.reloadStarting" => {
            tracing::info!("domain reload starting");
            state.session.begin_domain_reload();
        }
        "playModeChanged" => {
            if event.state() == Some("EnteredPlayMode") {
                state.logs.clear(Some("entered-play-mode".to_string()));
            }
        }
        _ => {}
    }
    state.events.publish(event);
}

fn spawn_readiness_probe(state: AppState, generation: u64) {
    tokio::spawn(async move {
        let deadline = Instant::now() + READY_PROBE_TIMEOUT;
        match state
            .correlator
            .send_request(&state.session, "editor.ping", None, None, deadline)
            .await
        {
            // Any non-error reply within the deadline counts as ready;
            // the payload is opaque.
            Ok(response) if !response.is_error() => {
                state.session.set_editor_ready(generation);
                tracing::info!("editor readiness probe succeeded");
            }
            Ok(_) => tracing::warn!("editor.ping answered with an error; not marking ready"),
            Err(e) => tracing::warn!("editor.ping probe failed: {}", e),
        }
    });
}

fn spawn_reload_grace_timer(state: AppState) {
    tokio::spawn(async move {
        let deadline = Instant::now() + state.config.grace_window();
        if state.session.wait_for_reconnect(deadline).await.is_ok() {
            return;
        }
        if state.session.expire_reload_grace() {
            let failed = state.correlator.fail_all_disconnected();
            tracing::warn!(failed, "domain reload grace window expired without reconnect");
        }
    });
}
