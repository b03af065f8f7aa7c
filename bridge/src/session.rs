use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use unityctl_protocol::{HelloMessage, WireMessage};

use crate::error::BridgeError;

/// Connection state published to waiters. The generation counter increases
/// on every connect, so a waiter can tell a reconnect from the session it
/// started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected { reloading: bool },
    Connected { generation: u64 },
}

/// What a reader-task exit means for the rest of the bridge.
#[derive(Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// Another peer already took the slot; nothing to clean up.
    Replaced,
    /// Peer went away with no domain reload announced: fail in-flight work.
    Dropped,
    /// Peer went away during a domain reload: hold in-flight work for the
    /// grace window.
    Reloading,
}

struct PeerHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

struct Inner {
    peer: Option<PeerHandle>,
    hello: Option<HelloMessage>,
    reload_in_progress: bool,
    next_generation: u64,
}

/// Tracks the single editor peer: its outbound channel, hello metadata,
/// readiness, and the domain-reload latch. At most one peer is live at a
/// time; a new connection atomically replaces the old one.
pub struct PeerSession {
    inner: Mutex<Inner>,
    editor_ready: AtomicBool,
    state_tx: watch::Sender<ConnState>,
}

impl PeerSession {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnState::Disconnected { reloading: false });
        Self {
            inner: Mutex::new(Inner {
                peer: None,
                hello: None,
                reload_in_progress: false,
                next_generation: 1,
            }),
            editor_ready: AtomicBool::new(false),
            state_tx,
        }
    }

    /// Install a freshly handshaken peer, replacing any prior one. Clears
    /// the domain-reload latch so reload waiters unblock, and returns the
    /// new connection generation.
    pub fn install_peer(
        &self,
        hello: HelloMessage,
        outbound: mpsc::UnboundedSender<WireMessage>,
    ) -> u64 {
        let generation = {
            let mut inner = self.inner.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            // Dropping the old handle closes its outbound channel, which
            // ends the old writer task.
            inner.peer = Some(PeerHandle {
                generation,
                outbound,
            });
            inner.hello = Some(hello);
            inner.reload_in_progress = false;
            generation
        };
        self.editor_ready.store(false, Ordering::Relaxed);
        // send_replace: the value must update even when nobody is
        // currently watching, so later waiters never see a stale state.
        let _ = self.state_tx.send_replace(ConnState::Connected { generation });
        generation
    }

    /// Record that the peer with `generation` is gone. A stale generation
    /// (already replaced by a newer peer) is a no-op.
    pub fn peer_lost(&self, generation: u64) -> Disconnect {
        let reloading = {
            let mut inner = self.inner.lock();
            match &inner.peer {
                Some(handle) if handle.generation == generation => {}
                _ => return Disconnect::Replaced,
            }
            inner.peer = None;
            inner.hello = None;
            inner.reload_in_progress
        };
        self.editor_ready.store(false, Ordering::Relaxed);
        let _ = self
            .state_tx
            .send_replace(ConnState::Disconnected { reloading });
        if reloading {
            Disconnect::Reloading
        } else {
            Disconnect::Dropped
        }
    }

    /// Latch a domain reload: the next disconnect gets the grace window.
    pub fn begin_domain_reload(&self) {
        self.inner.lock().reload_in_progress = true;
        self.editor_ready.store(false, Ordering::Relaxed);
    }

    /// Clear the reload latch after the grace window expired with no
    /// reconnect. Returns false if a peer reconnected in the meantime.
    pub fn expire_reload_grace(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.peer.is_none() && inner.reload_in_progress {
            inner.reload_in_progress = false;
            drop(inner);
            let _ = self
                .state_tx
                .send_replace(ConnState::Disconnected { reloading: false });
            true
        } else {
            false
        }
    }

    pub fn connected(&self) -> bool {
        self.inner.lock().peer.is_some()
    }

    pub fn reload_in_progress(&self) -> bool {
        self.inner.lock().reload_in_progress
    }

    pub fn hello(&self) -> Option<HelloMessage> {
        self.inner.lock().hello.clone()
    }

    pub fn editor_ready(&self) -> bool {
        self.editor_ready.load(Ordering::Relaxed)
    }

    /// Mark the editor ready, but only if `generation` is still current —
    /// a probe answered by a replaced peer must not flag the new one.
    pub fn set_editor_ready(&self, generation: u64) {
        let inner = self.inner.lock();
        if matches!(&inner.peer, Some(h) if h.generation == generation) {
            self.editor_ready.store(true, Ordering::Relaxed);
        }
    }

    /// Queue a frame for the single outbound writer task.
    pub fn send(&self, frame: WireMessage) -> Result<(), BridgeError> {
        let sender = {
            let inner = self.inner.lock();
            match &inner.peer {
                Some(handle) => handle.outbound.clone(),
                None => return Err(BridgeError::PeerUnavailable),
            }
        };
        sender
            .send(frame)
            .map_err(|_| BridgeError::PeerDisconnected)
    }

    /// Watch channel carrying `ConnState` transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnState> {
        self.state_tx.subscribe()
    }

    /// Block until a peer is connected, bounded by `deadline`.
    pub async fn wait_for_reconnect(&self, deadline: Instant) -> Result<(), BridgeError> {
        let mut rx = self.state_tx.subscribe();
        loop {
            if matches!(*rx.borrow_and_update(), ConnState::Connected { .. }) {
                return Ok(());
            }
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(BridgeError::Timeout)?;
            match tokio::time::timeout(remaining, rx.changed()).await {
                Err(_) => return Err(BridgeError::Timeout),
                Ok(Err(_)) => {
                    return Err(BridgeError::Internal("session state channel closed".into()))
                }
                Ok(Ok(())) => continue,
            }
        }
    }
}

impl Default for PeerSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hello() -> HelloMessage {
        HelloMessage {
            project_id: "proj-00000000".to_string(),
            unity_version: "6000.0.1f1".to_string(),
            protocol_version: unityctl_protocol::PROTOCOL_VERSION.to_string(),
            plugin_version: "0.3.0".to_string(),
            pid: None,
        }
    }

    #[test]
    fn install_and_lose_peer() {
        let session = PeerSession::new();
        assert!(!session.connected());

        let (tx, _rx) = mpsc::unbounded_channel();
        let generation = session.install_peer(hello(), tx);
        assert!(session.connected());
        assert!(session.hello().is_some());

        assert_eq!(session.peer_lost(generation), Disconnect::Dropped);
        assert!(!session.connected());
        assert!(session.hello().is_none());
    }

    #[test]
    fn reload_latch_changes_disconnect_kind() {
        let session = PeerSession::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let generation = session.install_peer(hello(), tx);

        session.begin_domain_reload();
        assert_eq!(session.peer_lost(generation), Disconnect::Reloading);
        assert!(session.reload_in_progress());
    }

    #[test]
    fn replacement_clears_reload_latch() {
        let session = PeerSession::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let gen1 = session.install_peer(hello(), tx1);
        session.begin_domain_reload();

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let gen2 = session.install_peer(hello(), tx2);
        assert!(gen2 > gen1);
        assert!(!session.reload_in_progress());

        // The old reader noticing its socket died must not clobber the
        // new session.
        assert_eq!(session.peer_lost(gen1), Disconnect::Replaced);
        assert!(session.connected());
    }

    #[test]
    fn readiness_ignores_stale_generation() {
        let session = PeerSession::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let gen1 = session.install_peer(hello(), tx1);
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let _gen2 = session.install_peer(hello(), tx2);

        session.set_editor_ready(gen1);
        assert!(!session.editor_ready());
    }

    #[test]
    fn expire_reload_grace_only_while_disconnected() {
        let session = PeerSession::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let generation = session.install_peer(hello(), tx);
        session.begin_domain_reload();

        // Peer still connected: nothing expires
        assert!(!session.expire_reload_grace());

        session.peer_lost(generation);
        assert!(session.expire_reload_grace());
        assert!(!session.reload_in_progress());
    }

    #[tokio::test]
    async fn wait_for_reconnect_resolves_on_install() {
        let session = std::sync::Arc::new(PeerSession::new());
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .wait_for_reconnect(Instant::now() + Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        session.install_peer(hello(), tx);

        waiter.await.unwrap().expect("waiter should resolve on connect");
    }

    #[tokio::test]
    async fn wait_for_reconnect_times_out() {
        let session = PeerSession::new();
        let result = session
            .wait_for_reconnect(Instant::now() + Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(BridgeError::Timeout)));
    }
}
