use std::sync::Arc;

use tokio::sync::broadcast;

use haven_core::events::SessionEvent;

use crate::client::ClientRegistry;
use crate::wire;

/// Subscribes to the engine's session event broadcast and forwards events
/// to the WebSocket clients watching each session.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Start the bridge. Spawns a task that reads from the broadcast
    /// channel and pushes serialized wire events to matching clients.
    pub fn start(&self, mut rx: broadcast::Receiver<SessionEvent>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let session_id = event.session_id().clone();
                        let wire_event = wire::session_event_to_wire(&event);
                        if let Ok(json) = serde_json::to_string(&wire_event) {
                            registry.broadcast_to_session(&session_id, &json);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<SessionEvent>,
) -> tokio::task::JoinHandle<()> {
    let bridge = EventBridge::new(registry);
    bridge.start(rx)
}

/// Serialize a session event to its wire form.
pub fn serialize_event(event: &SessionEvent) -> Option<String> {
    let wire = wire::session_event_to_wire(event);
    serde_json::to_string(&wire).ok()
}
