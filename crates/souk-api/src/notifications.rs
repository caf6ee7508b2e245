use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use souk_types::api::{Claims, NotificationView, Page, RefreshSignalRequest};
use souk_types::events::GatewayEvent;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_items_per_page() -> u32 {
    20
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Page<NotificationView>>, StatusCode> {
    let (items, total) = state
        .db
        .notifications_page(claims.sub, query.page.max(1), query.items_per_page.clamp(1, 100))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(Page::new(
        items,
        query.page.max(1),
        total,
        query.items_per_page.clamp(1, 100),
    )))
}

/// Bulk mark-read — the only mutation notifications see after fan-out.
pub async fn read_all_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let updated = state
        .db
        .mark_all_notifications_read(claims.sub)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "success": true, "updated": updated })))
}

/// Refresh-signal hook for sibling services: nudges every connected client of
/// one audience to refetch its notification list. Carries no payload.
pub async fn send_refresh_signal(
    State(state): State<AppState>,
    Json(req): Json<RefreshSignalRequest>,
) -> Json<serde_json::Value> {
    state
        .dispatcher
        .broadcast(GatewayEvent::NotificationRefresh {
            audience: req.audience,
        })
        .await;
    Json(serde_json::json!({ "success": true }))
}
