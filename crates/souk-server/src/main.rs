use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use souk_api::auth::{self, AppState, AppStateInner};
use souk_api::middleware::require_auth;
use souk_api::{history, moderation, notifications};
use souk_gateway::connection;
use souk_gateway::dispatcher::Dispatcher;
use souk_types::models::Audience;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "souk=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SOUK_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("SOUK_DB_PATH").unwrap_or_else(|_| "souk.db".into());
    let host = std::env::var("SOUK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SOUK_PORT")
        .unwrap_or_else(|_| "3005".into())
        .parse()?;
    let presence_interval: u64 = std::env::var("SOUK_PRESENCE_INTERVAL_SECS")
        .unwrap_or_else(|_| "8".into())
        .parse()?;

    // Init database
    let db = Arc::new(souk_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret,
    });

    // Periodic presence re-broadcast; stops on the shutdown signal.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let ticker_dispatcher = dispatcher.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(presence_interval));
        // connects broadcast their own snapshot; the ticker reconciles after
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => ticker_dispatcher.broadcast_presence().await,
                _ = shutdown_rx.changed() => break,
            }
        }
        info!("presence ticker stopped");
    });

    // Routes
    let protected_routes = Router::new()
        .route("/chat/conversations", get(history::get_conversations))
        .route("/chat/direct/messages", get(history::get_direct_messages))
        .route("/chat/channel/messages", get(history::get_channel_messages))
        .route("/chat/unread-flags", get(history::get_unread_flags))
        .route("/notifications", get(notifications::get_notifications))
        .route(
            "/notifications/read-all",
            post(notifications::read_all_notifications),
        )
        .route(
            "/notifications/refresh",
            post(notifications::send_refresh_signal),
        )
        .route(
            "/reports",
            post(moderation::report_message).get(moderation::get_reports),
        )
        .route(
            "/moderation/block/{id}",
            post(moderation::block_principal_handler),
        )
        .route("/messages/{id}", delete(moderation::delete_message))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Souk chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = ticker.await;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
    role: Option<Audience>,
}

/// Handshake auth happens here, before the upgrade completes: a bad token is
/// rejected with its typed reason and no gateway state is touched.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let (principal, audience) = match auth::verify_socket_auth(
        &state.db,
        &state.jwt_secret,
        query.token.as_deref(),
        query.role,
    ) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    let gateway = state.gateway_state();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, principal, audience))
        .into_response()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
