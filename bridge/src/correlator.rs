use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use unityctl_protocol::{RequestMessage, ResponseMessage, WireMessage};

use crate::error::BridgeError;
use crate::session::PeerSession;

enum Outcome {
    Response(ResponseMessage),
    Disconnected,
}

/// Joins stateless HTTP callers to the stateful peer: every outbound
/// request gets a fresh id and a completion slot; the peer's responses
/// resolve them by id, in any order. Every slot resolves exactly once —
/// by response, deadline, or disconnect.
pub struct Correlator {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Outcome>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Forward a command to the peer and await its response, bounded by
    /// `deadline`. If the peer is mid-domain-reload, waits for the
    /// reconnect first instead of failing.
    pub async fn send_request(
        &self,
        session: &PeerSession,
        command: &str,
        args: Option<Value>,
        agent_id: Option<String>,
        deadline: Instant,
    ) -> Result<ResponseMessage, BridgeError> {
        if !session.connected() {
            if session.reload_in_progress() {
                session.wait_for_reconnect(deadline).await?;
            } else {
                return Err(BridgeError::PeerUnavailable);
            }
        }

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = WireMessage::Request(RequestMessage {
            id,
            command: command.to_string(),
            args,
            agent_id,
        });
        if let Err(e) = session.send(frame) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx).await {
            Ok(Ok(Outcome::Response(response))) => Ok(response),
            Ok(Ok(Outcome::Disconnected)) => Err(BridgeError::PeerDisconnected),
            Ok(Err(_)) => Err(BridgeError::Internal(
                "pending request dropped without resolution".into(),
            )),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BridgeError::Timeout)
            }
        }
    }

    /// Resolve a pending request with the peer's response. Returns false
    /// for unmatched ids (a late response after the caller timed out).
    pub fn resolve(&self, response: ResponseMessage) -> bool {
        let entry = self.pending.lock().remove(&response.id);
        match entry {
            Some(tx) => tx.send(Outcome::Response(response)).is_ok(),
            None => false,
        }
    }

    /// Fail every in-flight request with `PEER_DISCONNECTED`. Called on a
    /// graceless disconnect and when the domain-reload grace window
    /// expires. Returns how many were drained.
    pub fn fail_all_disconnected(&self) -> usize {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Outcome::Disconnected);
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}
