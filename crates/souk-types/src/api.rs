use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageView, Principal, PrincipalKind};

// -- JWT Claims --

/// Claims shared between souk-api (REST middleware) and the WebSocket upgrade
/// in souk-server. Canonical definition lives here to eliminate duplication.
/// Tokens are issued by the external auth service; this subsystem only
/// verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub exp: usize,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal::from_parts(self.kind, self.sub)
    }
}

// -- Pagination --

/// Offset-pagination envelope shared by the history and report endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub last_page: u32,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, total_items: u64, items_per_page: u32) -> Self {
        let page = page.max(1);
        let per = items_per_page.max(1) as u64;
        Self {
            items,
            current_page: page,
            has_next_page: (per * page as u64) < total_items,
            has_previous_page: page > 1,
            last_page: total_items.div_ceil(per).max(1) as u32,
            total_items,
        }
    }
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub participants: Vec<Principal>,
    pub initiated_by: Principal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub unread_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageView>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportMessageRequest {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub reason: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockPrincipalRequest {
    pub report_id: Uuid,
    pub kind: PrincipalKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportView {
    pub id: Uuid,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub reported_by: Principal,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// The reported message plus up to 10 preceding ones, captured at report
    /// time (survives later message deletion).
    pub context: Vec<ReportContextEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_taken_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportContextEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub author: Principal,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub action_type: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Body of the refresh-signal hook used by sibling services to nudge
/// connected clients of one audience.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshSignalRequest {
    pub audience: crate::models::Audience,
}
