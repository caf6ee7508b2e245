use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use souk_types::events::OnlineUser;
use souk_types::models::{Audience, Principal};

/// A live connection's identity, created on successful handshake and
/// destroyed on disconnect or eviction. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub principal: Principal,
    pub audience: Audience,
}

/// Authoritative map of live sockets to principals, plus the ephemeral
/// chat-pairing and group-presence state that lives and dies with
/// connections.
///
/// Plain synchronous struct; the dispatcher confines it behind one lock.
/// Process-local and therefore non-authoritative across gateway instances —
/// scaling out requires a shared pub/sub backing for presence and rooms.
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: HashMap<Uuid, Session>,
    /// author principal id -> current chat partner id (direct chats)
    active_chats: HashMap<Uuid, Uuid>,
    /// group id -> principal ids currently viewing that group chat
    group_chats: HashMap<String, HashSet<Uuid>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the session, first dropping any existing entry for the same
    /// principal: a principal has at most one live socket. Returns the
    /// evicted socket id — that socket stays open (orphaned) until it
    /// disconnects or is evicted separately; only its registry entry is gone.
    pub fn register(&mut self, socket_id: Uuid, principal: Principal, audience: Audience) -> Option<Uuid> {
        let evicted = self
            .sessions
            .iter()
            .find(|(_, s)| s.principal.id() == principal.id())
            .map(|(sid, _)| *sid);
        if let Some(old) = evicted {
            self.sessions.remove(&old);
        }
        self.sessions.insert(socket_id, Session { principal, audience });
        evicted
    }

    pub fn unregister(&mut self, socket_id: Uuid) -> Option<Session> {
        self.sessions.remove(&socket_id)
    }

    pub fn lookup(&self, principal_id: Uuid) -> Option<Uuid> {
        self.sessions
            .iter()
            .find(|(_, s)| s.principal.id() == principal_id)
            .map(|(sid, _)| *sid)
    }

    pub fn snapshot(&self) -> Vec<OnlineUser> {
        self.sessions
            .values()
            .map(|s| OnlineUser {
                id: s.principal.id(),
                role: s.audience,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // -- Active-chat pairing (direct-message notification suppression) --

    pub fn start_chat(&mut self, author: Uuid, receiver: Uuid) {
        self.active_chats.insert(author, receiver);
    }

    /// Ends the pairing only if it still points at `receiver`, so a stale
    /// end-chat cannot tear down a newer pairing.
    pub fn end_chat(&mut self, author: Uuid, receiver: Uuid) {
        if self.active_chats.get(&author) == Some(&receiver) {
            self.active_chats.remove(&author);
        }
    }

    pub fn chat_partner(&self, author: Uuid) -> Option<Uuid> {
        self.active_chats.get(&author).copied()
    }

    // -- Group-chat presence (channel notification suppression) --

    pub fn join_group(&mut self, group_id: &str, principal_id: Uuid) {
        self.group_chats
            .entry(group_id.to_string())
            .or_default()
            .insert(principal_id);
    }

    pub fn leave_group(&mut self, group_id: &str, principal_id: Uuid) {
        if let Some(members) = self.group_chats.get_mut(group_id) {
            members.remove(&principal_id);
            if members.is_empty() {
                self.group_chats.remove(group_id);
            }
        }
    }

    pub fn group_members(&self, group_id: &str) -> HashSet<Uuid> {
        self.group_chats.get(group_id).cloned().unwrap_or_default()
    }

    /// Disconnect cleanup: drops every pairing involving the principal and
    /// removes them from every group presence set.
    pub fn clear_for(&mut self, principal_id: Uuid) {
        self.active_chats
            .retain(|author, receiver| *author != principal_id && *receiver != principal_id);
        self.group_chats.retain(|_, members| {
            members.remove(&principal_id);
            !members.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Principal {
        Principal::User(Uuid::new_v4())
    }

    #[test]
    fn at_most_one_socket_per_principal() {
        let mut registry = PresenceRegistry::new();
        let principal = user();

        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let s3 = Uuid::new_v4();

        assert_eq!(registry.register(s1, principal, Audience::Buyer), None);
        assert_eq!(registry.register(s2, principal, Audience::Buyer), Some(s1));
        assert_eq!(registry.register(s3, principal, Audience::Buyer), Some(s2));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(principal.id()), Some(s3));
    }

    #[test]
    fn stale_socket_unregister_does_not_touch_the_new_session() {
        let mut registry = PresenceRegistry::new();
        let principal = user();

        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        registry.register(old, principal, Audience::Seller);
        registry.register(new, principal, Audience::Seller);

        // The orphaned socket finally disconnects.
        assert!(registry.unregister(old).is_none());
        assert_eq!(registry.lookup(principal.id()), Some(new));
    }

    #[test]
    fn snapshot_lists_principal_and_role() {
        let mut registry = PresenceRegistry::new();
        let buyer = user();
        let admin = Principal::Admin(Uuid::new_v4());
        registry.register(Uuid::new_v4(), buyer, Audience::Buyer);
        registry.register(Uuid::new_v4(), admin, Audience::Admin);

        let mut snapshot = registry.snapshot();
        snapshot.sort_by_key(|u| u.id);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|u| u.id == buyer.id() && u.role == Audience::Buyer));
        assert!(snapshot.iter().any(|u| u.id == admin.id() && u.role == Audience::Admin));
    }

    #[test]
    fn stale_end_chat_keeps_newer_pairing() {
        let mut registry = PresenceRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        registry.start_chat(a, b);
        registry.start_chat(a, c);
        registry.end_chat(a, b);
        assert_eq!(registry.chat_partner(a), Some(c));

        registry.end_chat(a, c);
        assert_eq!(registry.chat_partner(a), None);
    }

    #[test]
    fn clear_for_drops_pairings_and_group_membership() {
        let mut registry = PresenceRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.start_chat(a, b);
        registry.start_chat(b, a);
        registry.join_group("com_Widget_1", a);
        registry.join_group("com_Widget_1", b);

        registry.clear_for(a);

        assert_eq!(registry.chat_partner(a), None);
        assert_eq!(registry.chat_partner(b), None);
        assert_eq!(
            registry.group_members("com_Widget_1"),
            HashSet::from([b])
        );
    }
}
