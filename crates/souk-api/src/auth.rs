use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use souk_db::Database;
use souk_gateway::GatewayState;
use souk_gateway::dispatcher::Dispatcher;
use souk_types::api::Claims;
use souk_types::models::{Audience, Principal};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// The same handles the gateway's chat engine runs on; lets REST
    /// handlers reuse fan-out and forced-disconnect paths.
    pub fn gateway_state(&self) -> GatewayState {
        GatewayState::new(self.db.clone(), self.dispatcher.clone())
    }
}

/// Typed handshake/verification failures. Rejections happen before any
/// registry or room mutation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("NOT_AUTHORIZED: token is missing")]
    TokenMissing,
    #[error("NOT_AUTHORIZED: invalid token")]
    InvalidToken,
    #[error("NOT_AUTHORIZED: session revoked")]
    SessionRevoked,
    #[error("auth store unavailable")]
    StoreUnavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

/// The token-verifier collaborator: checks the HS256 signature, then the
/// persisted session — a moderation revoke deletes the stored token, so a
/// structurally valid JWT stops working the moment the session is gone.
pub fn verify_token(db: &Database, secret: &str, token: Option<&str>) -> Result<Claims, AuthError> {
    let token = token.ok_or(AuthError::TokenMissing)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidToken)?;

    let stored = db
        .session_token(data.claims.principal())
        .map_err(|_| AuthError::StoreUnavailable)?;
    match stored {
        Some(t) if t == token => Ok(data.claims),
        _ => Err(AuthError::SessionRevoked),
    }
}

/// Handshake verification for the WebSocket upgrade: token plus the declared
/// role. A missing declaration falls back to the stored account audience.
pub fn verify_socket_auth(
    db: &Database,
    secret: &str,
    token: Option<&str>,
    declared_role: Option<Audience>,
) -> Result<(Principal, Audience), AuthError> {
    let claims = verify_token(db, secret, token)?;
    let principal = claims.principal();
    let audience = declared_role.unwrap_or_else(|| match principal {
        Principal::Admin(_) => Audience::Admin,
        Principal::User(_) => db.audience_of(principal),
    });
    Ok((principal, audience))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use souk_types::models::PrincipalKind;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn make_token(principal: Principal) -> String {
        let claims = Claims {
            sub: principal.id(),
            kind: principal.kind(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(2)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn missing_and_garbage_tokens_fail_with_typed_reasons() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            verify_token(&db, SECRET, None),
            Err(AuthError::TokenMissing)
        ));
        assert!(matches!(
            verify_token(&db, SECRET, Some("not-a-jwt")),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn revoked_session_rejects_a_structurally_valid_token() {
        let db = Database::open_in_memory().unwrap();
        let principal = Principal::User(Uuid::new_v4());
        let token = make_token(principal);

        db.upsert_session(principal, &token).unwrap();
        let claims = verify_token(&db, SECRET, Some(&token)).unwrap();
        assert_eq!(claims.sub, principal.id());
        assert_eq!(claims.kind, PrincipalKind::User);

        db.revoke_session(principal).unwrap();
        assert!(matches!(
            verify_token(&db, SECRET, Some(&token)),
            Err(AuthError::SessionRevoked)
        ));
    }
}
