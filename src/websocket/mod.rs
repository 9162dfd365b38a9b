use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod message_types;
pub mod pubsub;

use message_types::WsOutboundEvent;

/// Delivery scope for broadcast events: a conversation's room or a user's
/// personal notification room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    Conversation(Uuid),
    User(Uuid),
}

impl RoomId {
    /// Redis channel name for cross-instance fanout.
    pub fn channel(&self) -> String {
        match self {
            RoomId::Conversation(id) => format!("room:conversation:{id}"),
            RoomId::User(id) => format!("room:user:{id}"),
        }
    }

    pub fn from_channel(channel: &str) -> Option<Self> {
        let rest = channel.strip_prefix("room:")?;
        let (kind, id) = rest.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "conversation" => Some(RoomId::Conversation(id)),
            "user" => Some(RoomId::User(id)),
            _ => None,
        }
    }
}

/// Unique identifier for a live connection; allows precise cleanup when
/// the connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Subscriber {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

struct Connection {
    sender: UnboundedSender<String>,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<RoomId, Vec<Subscriber>>,
    connections: HashMap<ConnectionId, Connection>,
}

/// Room membership for live connections.
///
/// All mutation goes through register/join/leave/disconnect; the maps are
/// shared across every connection task behind one RwLock. Delivery is
/// best-effort enqueue onto each member's unbounded channel, so a slow or
/// dead socket never blocks the broadcasting task.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with an empty room set. Returns the
    /// connection id and the receiving half of its outbound channel.
    pub async fn register(&self) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            Connection {
                sender: tx,
                rooms: HashSet::new(),
            },
        );

        tracing::debug!(connection_id = %id, total = guard.connections.len(), "connection registered");
        (id, rx)
    }

    /// Add a connection to a room. Joining a room the connection is
    /// already in is a no-op.
    pub async fn join(&self, connection_id: ConnectionId, room: RoomId) {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.connections.get_mut(&connection_id) else {
            return;
        };
        if !connection.rooms.insert(room) {
            return;
        }
        let sender = connection.sender.clone();

        guard.rooms.entry(room).or_default().push(Subscriber {
            id: connection_id,
            sender,
        });

        tracing::debug!(connection_id = %connection_id, ?room, "joined room");
    }

    /// Remove a connection from a room. Leaving a room the connection is
    /// not in is a no-op.
    pub async fn leave(&self, connection_id: ConnectionId, room: RoomId) {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.connections.get_mut(&connection_id) else {
            return;
        };
        if !connection.rooms.remove(&room) {
            return;
        }

        if let Some(subscribers) = guard.rooms.get_mut(&room) {
            subscribers.retain(|s| s.id != connection_id);
            if subscribers.is_empty() {
                guard.rooms.remove(&room);
            }
        }

        tracing::debug!(connection_id = %connection_id, ?room, "left room");
    }

    pub async fn is_joined(&self, connection_id: ConnectionId, room: RoomId) -> bool {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&connection_id)
            .map(|c| c.rooms.contains(&room))
            .unwrap_or(false)
    }

    /// Deliver a payload to every connection in a room, the sender's own
    /// other connections included. Dead senders are dropped in place.
    pub async fn broadcast(&self, room: RoomId, payload: String) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.rooms.get_mut(&room) {
            let before = subscribers.len();
            subscribers.retain(|s| s.sender.send(payload.clone()).is_ok());
            let after = subscribers.len();

            if before != after {
                tracing::debug!(?room, dropped = before - after, active = after, "dead senders cleaned up");
            }
            if subscribers.is_empty() {
                guard.rooms.remove(&room);
            }
        }
    }

    /// Remove a connection from every room and release its resources.
    /// Safe to call regardless of how the connection terminated; repeated
    /// calls are no-ops.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.connections.remove(&connection_id) else {
            return;
        };

        for room in connection.rooms {
            if let Some(subscribers) = guard.rooms.get_mut(&room) {
                subscribers.retain(|s| s.id != connection_id);
                if subscribers.is_empty() {
                    guard.rooms.remove(&room);
                }
            }
        }

        tracing::debug!(connection_id = %connection_id, remaining = guard.connections.len(), "connection closed");
    }

    /// Member count of a room (for tests/metrics).
    pub async fn room_size(&self, room: RoomId) -> usize {
        let guard = self.inner.read().await;
        guard.rooms.get(&room).map(|v| v.len()).unwrap_or(0)
    }
}

/// Serialize an event and fan it out: locally through the registry and to
/// sibling instances through Redis. Failed fanout is logged, never
/// surfaced to the caller.
pub async fn broadcast_event(
    registry: &ConnectionRegistry,
    redis: &redis::Client,
    room: RoomId,
    event: &WsOutboundEvent,
) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, ?room, "failed to serialize event");
            return;
        }
    };

    registry.broadcast(room, payload.clone()).await;

    if let Err(e) = pubsub::publish(redis, room, &payload).await {
        tracing::warn!(error = %e, ?room, "redis publish failed, local delivery only");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_room_member() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::Conversation(Uuid::new_v4());

        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        registry.join(a, room).await;
        registry.join(b, room).await;

        registry.broadcast(room, "hello".into()).await;

        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn double_join_delivers_once() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::Conversation(Uuid::new_v4());

        let (a, mut rx_a) = registry.register().await;
        registry.join(a, room).await;
        registry.join(a, room).await;

        registry.broadcast(room, "once".into()).await;
        assert_eq!(rx_a.recv().await.unwrap(), "once");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_and_disconnect_stop_delivery() {
        let registry = ConnectionRegistry::new();
        let conversation = RoomId::Conversation(Uuid::new_v4());
        let user_room = RoomId::User(Uuid::new_v4());

        let (a, mut rx_a) = registry.register().await;
        registry.join(a, conversation).await;
        registry.join(a, user_room).await;

        // Leaving a room not joined is a no-op.
        registry
            .leave(a, RoomId::Conversation(Uuid::new_v4()))
            .await;
        assert!(registry.is_joined(a, conversation).await);

        registry.leave(a, conversation).await;
        registry.broadcast(conversation, "gone".into()).await;
        assert!(rx_a.try_recv().is_err());

        registry.disconnect(a).await;
        assert_eq!(registry.room_size(user_room).await, 0);
        registry.broadcast(user_room, "gone".into()).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_connections_are_dropped_from_rooms() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::Conversation(Uuid::new_v4());

        let (a, rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        registry.join(a, room).await;
        registry.join(b, room).await;
        drop(rx_a);

        registry.broadcast(room, "still here".into()).await;
        assert_eq!(rx_b.recv().await.unwrap(), "still here");
        assert_eq!(registry.room_size(room).await, 1);
    }

    #[test]
    fn room_channel_round_trips() {
        let id = Uuid::new_v4();
        for room in [RoomId::Conversation(id), RoomId::User(id)] {
            assert_eq!(RoomId::from_channel(&room.channel()), Some(room));
        }
        assert_eq!(RoomId::from_channel("room:group:not-a-uuid"), None);
        assert_eq!(RoomId::from_channel("other:channel"), None);
    }
}
