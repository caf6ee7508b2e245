//! Row types and column-parsing helpers. Rows stay distinct from the API
//! types in souk-types to keep the DB layer independent.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use souk_types::models::{ConversationKind, MessageKind, Principal, PrincipalKind};

pub struct ConversationRow {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub channel_key: String,
    pub product_name: Option<String>,
    pub initiated_by: Principal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author: Principal,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub receiver: Option<Principal>,
    pub reaction: String,
    pub poll_question: Option<String>,
    pub poll_allow_multiple: bool,
    pub created_at: DateTime<Utc>,
}

pub struct ReportRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub reported_by: Principal,
    pub reason: String,
    pub details: Option<String>,
    pub context_json: String,
    pub action_taken: Option<String>,
    pub action_taken_by: Option<Uuid>,
    pub action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn conversion_err(col: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_uuid(s: &str, col: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_err(col, e))
}

pub(crate) fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(col, e))
}

pub(crate) fn parse_principal(id: &str, kind: &str, col: usize) -> rusqlite::Result<Principal> {
    let id = parse_uuid(id, col)?;
    let kind = PrincipalKind::parse(kind).ok_or_else(|| {
        conversion_err(
            col,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown principal kind '{kind}'"),
            ),
        )
    })?;
    Ok(Principal::from_parts(kind, id))
}

pub(crate) fn parse_conversation_kind(s: &str, col: usize) -> rusqlite::Result<ConversationKind> {
    ConversationKind::parse(s).ok_or_else(|| {
        conversion_err(
            col,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown conversation kind '{s}'"),
            ),
        )
    })
}

pub(crate) fn parse_message_kind(s: &str, col: usize) -> rusqlite::Result<MessageKind> {
    MessageKind::parse(s).ok_or_else(|| {
        conversion_err(
            col,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown message kind '{s}'"),
            ),
        )
    })
}
