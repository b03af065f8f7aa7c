//! Shared helpers for the bridge integration tests: boot the full bridge
//! in-process on an ephemeral loopback port, drive it over real HTTP with
//! reqwest, and stand in for the editor with a scripted WebSocket peer.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use unityctl_bridge::{build_router, tailer, AppState, BridgeConfig};
use unityctl_protocol::{
    compute_project_id, editor_log_path, HelloMessage, RequestMessage, ResponseMessage,
    WireMessage, PROTOCOL_VERSION,
};
use uuid::Uuid;

/// Upper bound for any single wait in a test.
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);

pub struct TestBridge {
    pub port: u16,
    pub project_id: String,
    pub state: AppState,
    pub http: reqwest::Client,
    pub root: tempfile::TempDir,
    _server: tokio::task::JoinHandle<()>,
    _tailer: tokio::task::JoinHandle<()>,
}

/// Short timeouts so failure paths run in test time, not wall-clock time.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.timeout_default = 5;
    config.domain_reload_grace = 5;
    config
}

pub async fn spawn_bridge() -> TestBridge {
    spawn_bridge_with(test_config()).await
}

pub async fn spawn_bridge_with(config: BridgeConfig) -> TestBridge {
    let root = tempfile::tempdir().expect("temp project root");
    let project_root = root.path().to_path_buf();
    let project_id = compute_project_id(&project_root);

    let state = AppState::new(config, project_id.clone(), project_root.clone());
    let tailer_task = tailer::spawn(editor_log_path(&project_root), state.logs.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind ephemeral port");
    let port = listener.local_addr().unwrap().port();

    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestBridge {
        port,
        project_id,
        state,
        http: reqwest::Client::new(),
        root,
        _server: server,
        _tailer: tailer_task,
    }
}

impl TestBridge {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub async fn rpc(&self, body: Value) -> reqwest::Response {
        self.http
            .post(self.url("/rpc"))
            .json(&body)
            .send()
            .await
            .expect("rpc request")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        self.http
            .get(self.url(path))
            .send()
            .await
            .expect("get request")
            .json()
            .await
            .expect("json body")
    }

    /// Poll `path` until `predicate` accepts the body, or give up.
    pub async fn wait_for_json(&self, path: &str, predicate: impl Fn(&Value) -> bool) -> Value {
        let result = tokio::time::timeout(TEST_DEADLINE, async {
            loop {
                let body = self.get_json(path).await;
                if predicate(&body) {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await;
        result.unwrap_or_else(|_| panic!("condition never held for {}", path))
    }
}

// ---------------------------------------------------------------------------
// Fake editor peer
// ---------------------------------------------------------------------------

pub struct FakePeer {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FakePeer {
    /// Open the socket without sending a hello (handshake tests).
    pub async fn connect_raw(port: u16) -> Self {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{}/peer", port))
            .await
            .expect("ws connect");
        Self { ws }
    }

    /// Connect and complete the hello handshake.
    pub async fn connect(port: u16, project_id: &str) -> Self {
        let mut peer = Self::connect_raw(port).await;
        peer.send_frame(&WireMessage::Hello(HelloMessage {
            project_id: project_id.to_string(),
            unity_version: "6000.0.30f1".to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            plugin_version: "0.3.0".to_string(),
            pid: Some(4242),
        }))
        .await;
        peer
    }

    /// Connect, handshake, and answer the readiness probe.
    pub async fn connect_ready(bridge: &TestBridge) -> Self {
        let mut peer = Self::connect(bridge.port, &bridge.project_id).await;
        let ping = peer.expect_request_named("editor.ping").await;
        peer.respond_ok(ping.id, json!({})).await;
        peer
    }

    pub async fn send_frame(&mut self, frame: &WireMessage) {
        let json = serde_json::to_string(frame).expect("serialize frame");
        self.ws
            .send(Message::Text(json))
            .await
            .expect("send frame");
    }

    pub async fn send_event(&mut self, name: &str, payload: Value) {
        self.send_frame(&WireMessage::Event(unityctl_protocol::EventMessage::new(
            name, payload,
        )))
        .await;
    }

    pub async fn send_log(&mut self, level: &str, message: &str) {
        self.send_event("log", json!({"level": level, "message": message}))
            .await;
    }

    pub async fn respond_ok(&mut self, id: Uuid, result: Value) {
        self.send_frame(&WireMessage::Response(ResponseMessage::ok(id, result)))
            .await;
    }

    pub async fn respond_error(&mut self, id: Uuid, code: &str, message: &str) {
        self.send_frame(&WireMessage::Response(ResponseMessage::error(
            id,
            unityctl_protocol::ErrorInfo::new(code, message),
        )))
        .await;
    }

    /// Next parsed frame; None once the bridge closes the socket.
    pub async fn next_frame(&mut self) -> Option<WireMessage> {
        let result = tokio::time::timeout(TEST_DEADLINE, async {
            while let Some(message) = self.ws.next().await {
                match message.ok()? {
                    Message::Text(text) => {
                        return serde_json::from_str(&text).ok();
                    }
                    Message::Close(_) => return None,
                    _ => continue,
                }
            }
            None
        })
        .await;
        result.expect("timed out waiting for a frame")
    }

    pub async fn expect_request(&mut self) -> RequestMessage {
        match self.next_frame().await {
            Some(WireMessage::Request(request)) => request,
            other => panic!("expected a request frame, got {:?}", other),
        }
    }

    pub async fn expect_request_named(&mut self, command: &str) -> RequestMessage {
        let request = self.expect_request().await;
        assert_eq!(
            request.command, command,
            "expected the bridge to send {} next",
            command
        );
        request
    }

    /// True once the bridge has closed or dropped the socket.
    pub async fn expect_closed(&mut self) -> bool {
        self.next_frame().await.is_none()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
