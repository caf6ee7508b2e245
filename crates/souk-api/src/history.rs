use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use souk_db::conversations::direct_channel_key;
use souk_types::api::{Claims, ConversationSummary, Page};
use souk_types::models::{ChannelKind, ConversationKind, MessageView, UnreadFlags};

use crate::auth::AppState;

fn default_page() -> u32 {
    1
}

fn default_items_per_page() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct DirectHistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    pub author: Option<Uuid>,
    pub receiver: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
}

/// Paginated direct-chat history. Fetching a page marks every message in the
/// conversation addressed to the caller as read (guarded, so refetching is a
/// no-op), matching how clients treat an open thread.
pub async fn get_direct_messages(
    State(state): State<AppState>,
    Query(query): Query<DirectHistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Page<MessageView>>, StatusCode> {
    if query.conversation_id.is_none() && (query.author.is_none() || query.receiver.is_none()) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let reader = claims.principal();
    let db = state.db.clone();
    let page = query.page.max(1);
    let per = query.items_per_page.clamp(1, 200);

    let result = tokio::task::spawn_blocking(move || {
        let conversation = match query.conversation_id {
            Some(id) => db.conversation(id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
            None => {
                let key = direct_channel_key(query.author.unwrap(), query.receiver.unwrap());
                db.conversation_by_channel_key(&key, ConversationKind::Direct)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            }
        };
        let Some(conversation) = conversation else {
            return Ok(Page::new(Vec::new(), page, 0, per));
        };

        let kind = ConversationKind::Direct.message_kind();
        db.mark_conversation_read(conversation.id, reader, kind)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (ids, total) = db
            .messages_page(conversation.id, kind, page, per)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(view) = db
                .message_view(id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            {
                views.push(view);
            }
        }
        // Newest page first from the store; clients render oldest-first.
        views.reverse();
        Ok::<_, StatusCode>(Page::new(views, page, total, per))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ChannelHistoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    pub conversation_id: Option<Uuid>,
    pub channel_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
}

/// Paginated community/stake history; same read-marking contract as the
/// direct path.
pub async fn get_channel_messages(
    State(state): State<AppState>,
    Query(query): Query<ChannelHistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Page<MessageView>>, StatusCode> {
    if query.conversation_id.is_none() && query.channel_name.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let reader = claims.principal();
    let db = state.db.clone();
    let page = query.page.max(1);
    let per = query.items_per_page.clamp(1, 200);
    let conversation_kind = query.kind.conversation_kind();

    let result = tokio::task::spawn_blocking(move || {
        let conversation = match query.conversation_id {
            Some(id) => db.conversation(id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
            None => db
                .conversation_by_channel_key(query.channel_name.as_deref().unwrap(), conversation_kind)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        };
        let Some(conversation) = conversation else {
            return Ok(Page::new(Vec::new(), page, 0, per));
        };

        let kind = conversation_kind.message_kind();
        db.mark_conversation_read(conversation.id, reader, kind)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (ids, total) = db
            .messages_page(conversation.id, kind, page, per)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(view) = db
                .message_view(id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            {
                views.push(view);
            }
        }
        views.reverse();
        Ok::<_, StatusCode>(Page::new(views, page, total, per))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
}

/// The caller's conversation list for one kind, newest activity first, with
/// unread counts and the latest message resolved for preview rendering.
pub async fn get_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Page<ConversationSummary>>, StatusCode> {
    let reader = claims.principal();
    let db = state.db.clone();
    let page = query.page.max(1);
    let per = query.items_per_page.clamp(1, 100);
    let kind = query.kind;

    let result = tokio::task::spawn_blocking(move || {
        let (ids, total) = db
            .conversations_page(reader.id(), kind, page, per)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let message_kind = kind.message_kind();
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row) = db.conversation(id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            else {
                continue;
            };
            let participants = db
                .participants(id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let unread_count = db
                .unread_count_in(id, reader, message_kind)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let last_message = match db
                .last_message_id(id, message_kind)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            {
                Some(mid) => db
                    .message_view(mid)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
                None => None,
            };

            summaries.push(ConversationSummary {
                id,
                participants,
                initiated_by: row.initiated_by,
                channel_key: (kind != ConversationKind::Direct).then(|| row.channel_key.clone()),
                product_name: row.product_name,
                unread_count,
                last_message,
                updated_at: row.updated_at,
            });
        }
        Ok::<_, StatusCode>(Page::new(summaries, page, total, per))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(result))
}

/// One boolean per conversation kind: does the caller have anything unread.
pub async fn get_unread_flags(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadFlags>, StatusCode> {
    let flags = state
        .db
        .unread_flags(claims.principal())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(flags))
}
