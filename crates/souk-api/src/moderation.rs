use anyhow::Result;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use souk_gateway::GatewayState;
use souk_gateway::fanout::{self, NotificationSpec, Templates};
use souk_gateway::resolver::SUPER_ADMIN_ROLE;
use souk_types::api::{
    BlockPrincipalRequest, Claims, Page, ReportContextEntry, ReportMessageRequest, ReportView,
};
use souk_types::events::GatewayEvent;
use souk_types::models::{AccountStatus, Principal, PrincipalKind};

use crate::auth::AppState;

/// Outcome of the block flow; the HTTP layer maps these to status codes.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Suspended, token revoked, action recorded. `disconnected` says whether
    /// a live socket was evicted.
    Blocked { disconnected: bool },
    /// Retry of an already-applied block: a no-op, not an error.
    AlreadySuspended,
    AccountNotFound,
    ReportNotFound,
}

/// Suspend a principal over a reported message.
///
/// Ordering is load-bearing: the stored token is revoked BEFORE the forced
/// disconnect, closing the window where a reconnect with the stale token
/// could land between the two.
pub async fn block_principal(
    gateway: &GatewayState,
    principal: Principal,
    report_id: Uuid,
    actor: Uuid,
) -> Result<BlockOutcome> {
    let Some(status) = gateway.db.account_status(principal)? else {
        return Ok(BlockOutcome::AccountNotFound);
    };
    if status == AccountStatus::Suspended {
        return Ok(BlockOutcome::AlreadySuspended);
    }

    gateway
        .db
        .set_account_status(principal, AccountStatus::Suspended)?;
    gateway.db.revoke_session(principal)?;

    if !gateway
        .db
        .record_report_action(report_id, "temporary_suspension", actor)?
    {
        return Ok(BlockOutcome::ReportNotFound);
    }

    let disconnected = gateway
        .dispatcher
        .force_logout(
            principal.id(),
            GatewayEvent::LogoutUser {
                title: "Session Expired".to_string(),
                message: "You have been logged out due to a suspension. Please contact support \
                          if you believe this is a mistake."
                    .to_string(),
            },
        )
        .await;

    info!(
        "principal {} suspended by {} (live socket: {})",
        principal.id(),
        actor,
        disconnected
    );
    Ok(BlockOutcome::Blocked { disconnected })
}

fn require_admin(claims: &Claims) -> Result<(), StatusCode> {
    if claims.kind != PrincipalKind::Admin {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

pub async fn block_principal_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BlockPrincipalRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    require_admin(&claims)?;

    let principal = Principal::from_parts(req.kind, id);
    let outcome = block_principal(&state.gateway_state(), principal, req.report_id, claims.sub)
        .await
        .map_err(|e| {
            error!("block failed for {}: {:#}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match outcome {
        BlockOutcome::Blocked { .. } | BlockOutcome::AlreadySuspended => {
            Ok(Json(serde_json::json!({ "success": true, "message": "User blocked successfully!" })))
        }
        BlockOutcome::AccountNotFound => Err(StatusCode::NOT_FOUND),
        BlockOutcome::ReportNotFound => Err(StatusCode::NOT_FOUND),
    }
}

/// File a report: capture the reported message plus up to 10 preceding ones
/// as context, persist, and fan out to the super-admin bucket.
pub async fn report_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportMessageRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let reporter = claims.principal();

    let reported = state
        .db
        .message_row(req.message_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let context: Vec<ReportContextEntry> = state
        .db
        .report_context(req.conversation_id, req.message_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_iter()
        .map(|(content, author)| ReportContextEntry { content, author })
        .collect();
    let context_json =
        serde_json::to_string(&context).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .db
        .create_report(
            req.message_id,
            req.conversation_id,
            reporter,
            &req.reason,
            req.details.as_deref(),
            &context_json,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let reporter_name = state.db.profile_or_unknown(reporter).username;
    let spec = NotificationSpec {
        action_type: "message_reported".to_string(),
        title: "New Message Reported".to_string(),
        templates: Templates::same_for_all(format!(
            "A message has been reported for {} by {}. Reported message: {}",
            req.reason,
            reporter_name,
            reported.content.unwrap_or_default()
        )),
    };
    fanout::notify(&state.gateway_state(), &[], &spec, &[SUPER_ADMIN_ROLE])
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "success": true, "message": "Report created successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_items_per_page() -> u32 {
    10
}

pub async fn get_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Page<ReportView>>, StatusCode> {
    require_admin(&claims)?;

    let page = query.page.max(1);
    let per = query.items_per_page.clamp(1, 100);
    let (rows, total) = state
        .db
        .reports_page(page, per)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let views = rows
        .into_iter()
        .map(|row| ReportView {
            id: row.id,
            message_id: row.message_id,
            conversation_id: row.conversation_id,
            reported_by: row.reported_by,
            reason: row.reason,
            details: row.details,
            context: serde_json::from_str(&row.context_json).unwrap_or_default(),
            action_taken: row.action_taken,
            action_taken_by: row.action_taken_by,
            action_at: row.action_at,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(Page::new(views, page, total, per)))
}

/// Remove a message after review and tell its author why.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    require_admin(&claims)?;

    let message = state
        .db
        .message_row(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let report = state
        .db
        .report_for_message(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .db
        .delete_message(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let reason = report
        .and_then(|r| r.details.or(Some(r.reason)))
        .unwrap_or_else(|| "an unspecified reason".to_string());
    let spec = NotificationSpec {
        action_type: "message_deleted".to_string(),
        title: "Message Deleted!".to_string(),
        templates: Templates::same_for_all(format!(
            "One of your messages has been deleted for {}. Content: {}",
            reason,
            message.content.clone().unwrap_or_else(|| "Content not available.".to_string())
        )),
    };
    fanout::notify(&state.gateway_state(), &[message.author], &spec, &[])
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "success": true, "message": "Message Deleted Successfully!" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use souk_db::Database;
    use souk_gateway::dispatcher::{Dispatcher, SocketMessage};
    use souk_types::models::Audience;

    fn test_gateway() -> GatewayState {
        GatewayState::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
    }

    async fn seed_report(gateway: &GatewayState, offender: Uuid) -> Uuid {
        let other = Uuid::new_v4();
        gateway
            .db
            .create_user(offender, "mara", "Mara", Audience::Seller)
            .unwrap();
        gateway
            .db
            .create_user(other, "nur", "Nur", Audience::Buyer)
            .unwrap();
        let conversation = gateway.db.find_or_create_direct(offender, other).unwrap();
        let message = gateway
            .db
            .insert_direct_message(
                conversation.id,
                Principal::User(offender),
                Principal::User(other),
                "spam",
            )
            .unwrap();
        gateway
            .db
            .create_report(
                message,
                conversation.id,
                Principal::User(other),
                "spam",
                None,
                "[]",
            )
            .unwrap()
    }

    #[tokio::test]
    async fn block_revokes_token_kicks_the_socket_and_drains_the_registry() {
        let gateway = test_gateway();
        let offender = Uuid::new_v4();
        let report_id = seed_report(&gateway, offender).await;
        let principal = Principal::User(offender);

        gateway.db.upsert_session(principal, "live-token").unwrap();
        let socket_id = Uuid::new_v4();
        let mut rx = gateway.dispatcher.attach(socket_id).await;
        gateway
            .dispatcher
            .register_presence(socket_id, principal, Audience::Seller)
            .await;

        let admin = Uuid::new_v4();
        let outcome = block_principal(&gateway, principal, report_id, admin)
            .await
            .unwrap();

        assert_eq!(outcome, BlockOutcome::Blocked { disconnected: true });
        assert_eq!(gateway.db.session_token(principal).unwrap(), None);
        assert!(matches!(
            rx.try_recv(),
            Ok(SocketMessage::Kick(GatewayEvent::LogoutUser { .. }))
        ));
        assert_eq!(gateway.dispatcher.lookup_socket(offender).await, None);

        let report = gateway.db.report(report_id).unwrap().unwrap();
        assert_eq!(report.action_taken.as_deref(), Some("temporary_suspension"));
        assert_eq!(report.action_taken_by, Some(admin));
    }

    #[tokio::test]
    async fn blocking_twice_is_a_noop() {
        let gateway = test_gateway();
        let offender = Uuid::new_v4();
        let report_id = seed_report(&gateway, offender).await;
        let principal = Principal::User(offender);
        let admin = Uuid::new_v4();

        let first = block_principal(&gateway, principal, report_id, admin)
            .await
            .unwrap();
        assert_eq!(first, BlockOutcome::Blocked { disconnected: false });

        let second = block_principal(&gateway, principal, report_id, admin)
            .await
            .unwrap();
        assert_eq!(second, BlockOutcome::AlreadySuspended);
    }

    #[tokio::test]
    async fn blocking_an_unknown_account_reports_not_found() {
        let gateway = test_gateway();
        let outcome = block_principal(
            &gateway,
            Principal::User(Uuid::new_v4()),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, BlockOutcome::AccountNotFound);
    }
}
