use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Audience, ChannelKind, MessageView, PollSpec, PollView, Principal, ReactionEntry,
};

/// Commands sent FROM client TO server over the WebSocket.
///
/// Wire names are pinned per-variant; the envelope is the same tagged shape
/// used for events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Mark the author as actively viewing the thread with `receiver` —
    /// suppresses direct-message notifications while the pairing holds.
    #[serde(rename = "start-chat")]
    StartChat { author: Uuid, receiver: Uuid },

    #[serde(rename = "end-chat")]
    EndChat { author: Uuid, receiver: Uuid },

    #[serde(rename = "direct-message")]
    DirectMessage {
        author: Uuid,
        receiver: Uuid,
        content: String,
    },

    #[serde(rename = "group-reaction")]
    GroupReaction {
        reaction: String,
        message_id: Uuid,
        sender: Principal,
        channel_name: String,
    },

    #[serde(rename = "private-reaction")]
    PrivateReaction {
        reaction: String,
        message_id: Uuid,
        receiver_id: Uuid,
        sender_id: Uuid,
    },

    /// Direct-chat seen receipt for a single message.
    #[serde(rename = "get-seen-message")]
    GetSeenMessage {
        conversation_id: Uuid,
        message_id: Uuid,
        reader: Principal,
    },

    #[serde(rename = "send-com-msg")]
    SendComMsg(ChannelMessagePayload),

    #[serde(rename = "join-group-chat")]
    JoinGroupChat { user_id: Uuid, group_id: String },

    #[serde(rename = "leave-group-chat")]
    LeaveGroupChat { user_id: Uuid, group_id: String },

    /// Group-chat seen receipt for a single message.
    #[serde(rename = "send-com-seen-msg")]
    SendComSeenMsg {
        conversation_id: Uuid,
        message_id: Uuid,
        reader: Principal,
    },

    #[serde(rename = "cast-pool-vote")]
    CastPoolVote {
        option_id: Uuid,
        msg_id: Uuid,
        voter: Principal,
        checked: bool,
        #[serde(default)]
        allow_multiple: bool,
    },

    #[serde(rename = "clear-pool-votes")]
    ClearPoolVotes { msg_id: Uuid, voter: Principal },

    #[serde(rename = "join-room")]
    JoinRoom { room_id: String },
}

/// Payload of `send-com-msg`. The product context comes over the wire — the
/// product catalog is a separate service and is not mirrored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessagePayload {
    pub product_name: String,
    pub product_id: String,
    pub product_owner_id: Uuid,
    pub author: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PollSpec>,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Set when the client already knows the conversation; skips resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Presence snapshot, broadcast on connect and on the periodic ticker.
    #[serde(rename = "online-users")]
    OnlineUsers { online_users: Vec<OnlineUser> },

    #[serde(rename = "direct-chat-history")]
    DirectChatHistory {
        message: MessageView,
        participants: Vec<Principal>,
        conversation_id: Uuid,
    },

    #[serde(rename = "com-message-history")]
    ComMessageHistory {
        channel_name: String,
        message: MessageView,
        participants: Vec<Principal>,
        conversation_id: Uuid,
    },

    #[serde(rename = "seen-message-response")]
    SeenMessageResponse { message: MessageView },

    /// Direct-chat reaction echo to both ends.
    #[serde(rename = "reaction-added")]
    ReactionAdded { reaction: String, message_id: Uuid },

    /// Full updated reaction list after a group-reaction mutation.
    #[serde(rename = "added-group-reaction")]
    AddedGroupReaction {
        reactions: Vec<ReactionEntry>,
        message_id: Uuid,
    },

    #[serde(rename = "pool-response")]
    PoolResponse { message_id: Uuid, pool: PollView },

    /// Tells a member's live socket to join a freshly created channel room.
    #[serde(rename = "join-channel-room")]
    JoinChannelRoom { room_id: String },

    /// Forced logout on moderation; delivered to the exact socket.
    #[serde(rename = "logout-user")]
    LogoutUser { title: String, message: String },

    /// Payload-free hint that the audience's notification list changed;
    /// clients re-fetch. Best-effort push, not a delivery guarantee.
    #[serde(rename = "notification-refresh")]
    NotificationRefresh { audience: Audience },

    /// Scoped handler error, emitted to the originating socket only.
    #[serde(rename = "chat-error")]
    ChatError { context: String, message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OnlineUser {
    pub id: Uuid,
    pub role: Audience,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_names_match_the_socket_surface() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"direct-message","data":{"author":"9f2c7c62-1111-4a5b-9d52-000000000001","receiver":"9f2c7c62-1111-4a5b-9d52-000000000002","content":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::DirectMessage { content, .. } => assert_eq!(content, "hi"),
            other => panic!("parsed wrong variant: {:?}", other),
        }
    }

    #[test]
    fn logout_event_serializes_with_wire_name() {
        let json = serde_json::to_string(&GatewayEvent::LogoutUser {
            title: "Session Expired".into(),
            message: "suspended".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"logout-user""#));
        assert!(json.contains(r#""title":"Session Expired""#));
    }
}
