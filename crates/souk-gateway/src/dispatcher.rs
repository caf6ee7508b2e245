use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::info;
use uuid::Uuid;

use souk_types::events::GatewayEvent;
use souk_types::models::{Audience, Principal};

use crate::registry::PresenceRegistry;

/// What the connection loop receives on its per-socket channel.
#[derive(Debug)]
pub enum SocketMessage {
    Event(GatewayEvent),
    /// Deliver the event, then close the socket (moderation eviction).
    Kick(GatewayEvent),
}

/// Manages all connected sockets: presence registry, per-socket channels,
/// and named broadcast rooms.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: RwLock<PresenceRegistry>,

    /// Per-socket targeted send channels.
    sockets: RwLock<HashMap<Uuid, mpsc::UnboundedSender<SocketMessage>>>,

    /// room name -> member socket ids
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: RwLock::new(PresenceRegistry::new()),
                sockets: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    // -- Socket lifecycle --

    /// Registers a per-socket channel. Returns the receiver the connection
    /// loop drains.
    pub async fn attach(&self, socket_id: Uuid) -> mpsc::UnboundedReceiver<SocketMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sockets.write().await.insert(socket_id, tx);
        rx
    }

    pub async fn register_presence(&self, socket_id: Uuid, principal: Principal, audience: Audience) {
        let evicted = self
            .inner
            .registry
            .write()
            .await
            .register(socket_id, principal, audience);
        if let Some(old) = evicted {
            info!(
                "principal {} reconnected; evicted registry entry for socket {}",
                principal.id(),
                old
            );
        }
    }

    /// Disconnect cleanup. Pairings and group presence are cleared only when
    /// this socket still owned the principal's registry entry — a stale
    /// disconnect after eviction must not clobber the new session's state.
    pub async fn disconnect(&self, socket_id: Uuid) {
        let session = {
            let mut registry = self.inner.registry.write().await;
            let session = registry.unregister(socket_id);
            if let Some(s) = session {
                registry.clear_for(s.principal.id());
            }
            session
        };

        self.leave_all_rooms(socket_id).await;
        self.inner.sockets.write().await.remove(&socket_id);

        if let Some(s) = session {
            info!("principal {} disconnected", s.principal.id());
        }
    }

    pub async fn lookup_socket(&self, principal_id: Uuid) -> Option<Uuid> {
        self.inner.registry.read().await.lookup(principal_id)
    }

    pub async fn online_snapshot(&self) -> Vec<souk_types::events::OnlineUser> {
        self.inner.registry.read().await.snapshot()
    }

    // -- Emits --

    /// Sends a targeted event to one socket. Returns false if the socket is
    /// gone; sends to dead sockets are silently dropped, like any
    /// fire-and-forget push.
    pub async fn send_to_socket(&self, socket_id: Uuid, event: GatewayEvent) -> bool {
        let sockets = self.inner.sockets.read().await;
        match sockets.get(&socket_id) {
            Some(tx) => tx.send(SocketMessage::Event(event)).is_ok(),
            None => false,
        }
    }

    /// Sends to the principal's live socket, if any (registry lookup).
    pub async fn send_to_principal(&self, principal_id: Uuid, event: GatewayEvent) -> bool {
        match self.lookup_socket(principal_id).await {
            Some(socket_id) => self.send_to_socket(socket_id, event).await,
            None => false,
        }
    }

    /// Broadcasts to every connected socket.
    pub async fn broadcast(&self, event: GatewayEvent) {
        let sockets = self.inner.sockets.read().await;
        for tx in sockets.values() {
            let _ = tx.send(SocketMessage::Event(event.clone()));
        }
    }

    /// Broadcasts the current presence snapshot to everyone.
    pub async fn broadcast_presence(&self) {
        let online_users = self.online_snapshot().await;
        self.broadcast(GatewayEvent::OnlineUsers { online_users }).await;
    }

    // -- Rooms --

    pub async fn join_room(&self, room: &str, socket_id: Uuid) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room.to_string())
            .or_default()
            .insert(socket_id);
    }

    pub async fn leave_room(&self, room: &str, socket_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&socket_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub async fn leave_all_rooms(&self, socket_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&socket_id);
            !members.is_empty()
        });
    }

    pub async fn broadcast_room(&self, room: &str, event: GatewayEvent) {
        let members: Vec<Uuid> = {
            let rooms = self.inner.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members.iter().copied().collect(),
                None => return,
            }
        };
        let sockets = self.inner.sockets.read().await;
        for socket_id in members {
            if let Some(tx) = sockets.get(&socket_id) {
                let _ = tx.send(SocketMessage::Event(event.clone()));
            }
        }
    }

    // -- Ephemeral chat state (delegated to the registry) --

    pub async fn start_chat(&self, author: Uuid, receiver: Uuid) {
        self.inner.registry.write().await.start_chat(author, receiver);
    }

    pub async fn end_chat(&self, author: Uuid, receiver: Uuid) {
        self.inner.registry.write().await.end_chat(author, receiver);
    }

    pub async fn chat_partner(&self, author: Uuid) -> Option<Uuid> {
        self.inner.registry.read().await.chat_partner(author)
    }

    pub async fn join_group(&self, group_id: &str, principal_id: Uuid) {
        self.inner.registry.write().await.join_group(group_id, principal_id);
    }

    pub async fn leave_group(&self, group_id: &str, principal_id: Uuid) {
        self.inner.registry.write().await.leave_group(group_id, principal_id);
    }

    pub async fn group_members(&self, group_id: &str) -> HashSet<Uuid> {
        self.inner.registry.read().await.group_members(group_id)
    }

    // -- Moderation --

    /// Forced disconnect: deliver `event` to the principal's exact socket,
    /// close it, drop the registry entry, and leave every room it had joined.
    /// The caller must have revoked the stored token already. Returns false
    /// when the principal has no live connection.
    pub async fn force_logout(&self, principal_id: Uuid, event: GatewayEvent) -> bool {
        let socket_id = {
            let mut registry = self.inner.registry.write().await;
            let Some(socket_id) = registry.lookup(principal_id) else {
                return false;
            };
            registry.unregister(socket_id);
            registry.clear_for(principal_id);
            socket_id
        };

        self.leave_all_rooms(socket_id).await;

        let sockets = self.inner.sockets.read().await;
        if let Some(tx) = sockets.get(&socket_id) {
            let _ = tx.send(SocketMessage::Kick(event));
        }
        true
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_broadcast_reaches_only_members() {
        let dispatcher = Dispatcher::new();
        let in_room = Uuid::new_v4();
        let outside = Uuid::new_v4();
        let mut rx_in = dispatcher.attach(in_room).await;
        let mut rx_out = dispatcher.attach(outside).await;

        dispatcher.join_room("com_Widget_1", in_room).await;
        dispatcher
            .broadcast_room(
                "com_Widget_1",
                GatewayEvent::JoinChannelRoom {
                    room_id: "com_Widget_1".into(),
                },
            )
            .await;

        assert!(matches!(
            rx_in.try_recv(),
            Ok(SocketMessage::Event(GatewayEvent::JoinChannelRoom { .. }))
        ));
        assert!(rx_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn force_logout_kicks_the_exact_socket_and_clears_presence() {
        let dispatcher = Dispatcher::new();
        let principal = Principal::User(Uuid::new_v4());
        let socket_id = Uuid::new_v4();
        let mut rx = dispatcher.attach(socket_id).await;
        dispatcher
            .register_presence(socket_id, principal, Audience::Seller)
            .await;
        dispatcher.join_room("stake_Widget_1", socket_id).await;

        let delivered = dispatcher
            .force_logout(
                principal.id(),
                GatewayEvent::LogoutUser {
                    title: "Session Expired".into(),
                    message: "suspended".into(),
                },
            )
            .await;

        assert!(delivered);
        assert!(matches!(
            rx.try_recv(),
            Ok(SocketMessage::Kick(GatewayEvent::LogoutUser { .. }))
        ));
        assert_eq!(dispatcher.lookup_socket(principal.id()).await, None);

        // Room membership is gone too: a room broadcast reaches nobody.
        dispatcher
            .broadcast_room(
                "stake_Widget_1",
                GatewayEvent::JoinChannelRoom {
                    room_id: "stake_Widget_1".into(),
                },
            )
            .await;
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn force_logout_without_live_connection_is_a_noop() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher
            .force_logout(
                Uuid::new_v4(),
                GatewayEvent::LogoutUser {
                    title: "t".into(),
                    message: "m".into(),
                },
            )
            .await;
        assert!(!delivered);
    }
}
