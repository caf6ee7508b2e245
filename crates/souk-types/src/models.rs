use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat participant: a marketplace user or a back-office admin.
///
/// The tag is part of the identity — it is recorded on every message and
/// conversation reference and never changes once written. User and admin ids
/// live in separate account tables, so the tag is required to resolve one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Principal {
    User(Uuid),
    Admin(Uuid),
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::User(id) | Principal::Admin(id) => *id,
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User(_) => PrincipalKind::User,
            Principal::Admin(_) => PrincipalKind::Admin,
        }
    }

    pub fn from_parts(kind: PrincipalKind, id: Uuid) -> Self {
        match kind {
            PrincipalKind::User => Principal::User(id),
            PrincipalKind::Admin => Principal::Admin(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(PrincipalKind::User),
            "admin" => Some(PrincipalKind::Admin),
            _ => None,
        }
    }
}

/// Notification/refresh category. Users are buyers or sellers (stored on the
/// account row); admins are always `Admin`. Also the declared role shown in
/// the presence snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Buyer,
    Seller,
    Admin,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Buyer => "buyer",
            Audience::Seller => "seller",
            Audience::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Audience::Buyer),
            "seller" => Some(Audience::Seller),
            "admin" => Some(Audience::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    Direct,
    Community,
    Stake,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "DIRECT",
            ConversationKind::Community => "COMMUNITY",
            ConversationKind::Stake => "STAKE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECT" => Some(ConversationKind::Direct),
            "COMMUNITY" => Some(ConversationKind::Community),
            "STAKE" => Some(ConversationKind::Stake),
            _ => None,
        }
    }

    pub fn message_kind(&self) -> MessageKind {
        match self {
            ConversationKind::Direct => MessageKind::DirectMessage,
            ConversationKind::Community => MessageKind::ComChatMessage,
            ConversationKind::Stake => MessageKind::StakeChatMessage,
        }
    }
}

/// The group-chat flavor carried on `send-com-msg`; DIRECT never arrives on
/// that path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Community,
    Stake,
}

impl ChannelKind {
    pub fn conversation_kind(&self) -> ConversationKind {
        match self {
            ChannelKind::Community => ConversationKind::Community,
            ChannelKind::Stake => ConversationKind::Stake,
        }
    }

    /// Channel-key prefix: `com_...` / `stake_...`.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Community => "com",
            ChannelKind::Stake => "stake",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    DirectMessage,
    ComChatMessage,
    StakeChatMessage,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::DirectMessage => "DIRECT_MESSAGE",
            MessageKind::ComChatMessage => "COM_CHAT_MESSAGE",
            MessageKind::StakeChatMessage => "STAKE_CHAT_MESSAGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECT_MESSAGE" => Some(MessageKind::DirectMessage),
            "COM_CHAT_MESSAGE" => Some(MessageKind::ComChatMessage),
            "STAKE_CHAT_MESSAGE" => Some(MessageKind::StakeChatMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            _ => None,
        }
    }
}

// -- Polls --

/// Poll definition as sent by the client when posting a group message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Poll state with voters resolved, as broadcast in `pool-response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollView {
    pub question: String,
    pub options: Vec<PollOptionView>,
    pub allow_multiple: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOptionView {
    pub id: Uuid,
    pub label: String,
    pub voters: Vec<Principal>,
}

// -- Resolved views --

/// Display fields for a participant, resolved from the account tables for
/// client rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub id: Uuid,
    pub kind: PrincipalKind,
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl ProfileView {
    pub fn principal(&self) -> Principal {
        Principal::from_parts(self.kind, self.id)
    }
}

/// One entry of a group message's reaction list; at most one per sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub sender: Principal,
    pub reaction: String,
}

/// A message with author/receiver display fields resolved — the shape emitted
/// over the gateway and returned from history endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub author: ProfileView,
    /// DIRECT only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ProfileView>,
    /// Group kinds only; fixed at send time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<ProfileView>,
    #[serde(default)]
    pub read_by: Vec<Principal>,
    /// DIRECT reaction scalar; empty when unset.
    #[serde(default)]
    pub reaction: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PollView>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Per-kind "has unread" buckets for the badge query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UnreadFlags {
    pub personal: bool,
    pub community: bool,
    pub stake: bool,
}
