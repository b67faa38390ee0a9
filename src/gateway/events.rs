use crate::types::Event;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-subscriber queue depth. A subscriber that falls this far behind has
/// the frame dropped rather than blocking the emitter.
const SUBSCRIBER_BUFFER: usize = 256;

/// Broadcasts progress events to all connected observers.
///
/// Each event is serialized once and the same JSON frame is delivered to
/// every subscriber. Delivery is independent per subscriber: a disconnected
/// one is detached, a slow one loses the frame, and neither affects the rest.
pub struct EventBroadcaster {
    clients: DashMap<String, mpsc::Sender<String>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Subscribe a new observer and return (subscriber_id, frame receiver).
    pub fn subscribe(&self) -> (String, mpsc::Receiver<String>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.clients.insert(client_id.clone(), tx);
        log::debug!("subscriber {} attached", client_id);
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        self.clients.remove(client_id);
        log::debug!("subscriber {} detached", client_id);
    }

    /// Serialize the event once and fan the frame out to every subscriber.
    /// Never blocks: delivery is a single `try_send` per subscriber.
    pub fn emit(&self, event: Event) {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("failed to encode event: {}", err);
                return;
            }
        };

        let mut closed = Vec::new();
        for entry in self.clients.iter() {
            match entry.value().try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Queue full: drop this frame for this subscriber only.
                    log::warn!("subscriber {} is lagging, dropping frame", entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(entry.key().clone());
                }
            }
        }

        for client_id in closed {
            self.clients.remove(&client_id);
            log::debug!("removed disconnected subscriber {}", client_id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
