//! WebSocket client registry and connection lifecycle. One task per
//! connection drives the socket, its outbound queue, and the heartbeat
//! from a single select loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use haven_core::ids::SessionId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client. A client watches at most one session;
/// event delivery filters on it.
pub struct Client {
    pub id: ClientId,
    session: RwLock<Option<SessionId>>,
    tx: mpsc::Sender<String>,
    last_pong: AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            session: RwLock::new(None),
            tx,
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn watched_session(&self) -> Option<SessionId> {
        self.session.read().clone()
    }

    pub fn watches(&self, session_id: &SessionId) -> bool {
        self.session.read().as_ref() == Some(session_id)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID plus the outbound receiver.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients
            .insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        (id, rx)
    }

    pub fn unregister(&self, id: &ClientId) {
        self.clients.remove(id);
    }

    /// Bind a client to the session whose events it should receive.
    pub fn bind_session(&self, client_id: &ClientId, session_id: SessionId) {
        if let Some(client) = self.clients.get(client_id) {
            *client.session.write() = Some(session_id);
        }
    }

    pub fn record_pong(&self, client_id: &ClientId) {
        if let Some(client) = self.clients.get(client_id) {
            client.record_pong();
        }
    }

    /// Send a message to a specific client. The send never blocks; a full
    /// queue drops the message with a warning.
    pub fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %client_id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Broadcast a message to all clients watching a session.
    pub fn broadcast_to_session(&self, session_id: &SessionId, message: &str) {
        for entry in self.clients.iter() {
            if entry.value().watches(session_id) {
                let _ = entry.value().tx.try_send(message.to_string());
            }
        }
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients_for_session(&self, session_id: &SessionId) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|entry| entry.value().watches(session_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove clients that have not answered a ping within the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        for id in &dead {
            self.clients.remove(id);
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        dead.len()
    }
}

/// Drive one WebSocket connection: one loop multiplexes the socket, the
/// client's outbound queue, and the heartbeat ping.
pub async fn handle_ws_connection(
    mut socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
) {
    let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = on_message.send((client_id.clone(), text.to_string())).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        registry.record_pong(&client_id);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // axum answers pings itself
                    Some(Err(_)) => break,
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if socket.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
                tracing::trace!(client_id = %client_id, "sent ping");
            }
        }
    }

    registry.unregister(&client_id);
}

/// Background task that periodically removes dead clients.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed = removed, "dead client cleanup");
            }
        }
    })
}
