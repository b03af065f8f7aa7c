use tokio::sync::broadcast;
use tokio::time::Instant;

use unityctl_protocol::EventMessage;

use crate::error::BridgeError;

const BUS_CAPACITY: usize = 256;

/// Broadcast bus for peer events. Compound flows subscribe BEFORE sending
/// the command that elicits the events they wait on, so nothing is missed
/// between ack and event.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: EventMessage) {
        // No subscribers is fine; events are fire-and-forget here.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A single subscriber's view of the bus.
pub struct EventStream {
    rx: broadcast::Receiver<EventMessage>,
}

impl EventStream {
    /// Next event, bounded by `deadline`.
    pub async fn next(&mut self, deadline: Instant) -> Result<EventMessage, BridgeError> {
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(BridgeError::Timeout)?;
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Err(_) => return Err(BridgeError::Timeout),
                Ok(Ok(event)) => return Ok(event),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!("event subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(BridgeError::Internal("event bus closed".into()))
                }
            }
        }
    }

    /// Skip events until one matches `predicate`, bounded by `deadline`.
    pub async fn next_match(
        &mut self,
        deadline: Instant,
        predicate: impl Fn(&EventMessage) -> bool,
    ) -> Result<EventMessage, BridgeError> {
        loop {
            let event = self.next(deadline).await?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// Await the named event, bounded by `deadline`.
    pub async fn next_named(
        &mut self,
        deadline: Instant,
        name: &str,
    ) -> Result<EventMessage, BridgeError> {
        self.next_match(deadline, |e| e.name == name).await
    }
}
