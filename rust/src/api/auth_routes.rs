//! Login, logout and session lookup

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{require_session, ApiError};
use crate::app::Services;
use crate::session::{AuthoritySessionResult, UserSession};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn routes() -> Router<Services> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/session", get(current_session))
}

async fn login(
    State(services): State<Services>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let outcome = services
        .gate
        .login(&request.username, &request.password)
        .await?;

    let authority = match &outcome.authority {
        AuthoritySessionResult::Connected { token, elapsed_ms } => json!({
            "connected": true,
            "mock": token.is_mock,
            "expiration": token.expiration,
            "elapsed_ms": elapsed_ms,
        }),
        AuthoritySessionResult::Failed { elapsed_ms, .. } => json!({
            "connected": false,
            "elapsed_ms": elapsed_ms,
        }),
    };

    Ok(Json(json!({
        "success": true,
        "session_id": outcome.session.session_id,
        "user": outcome.session.user,
        "authority": authority,
        "flash": outcome.flash,
        "redirect": outcome.redirect,
    })))
}

async fn logout(
    State(services): State<Services>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, ApiError> {
    let session = require_session(&services, &headers).await?;
    if !services.gate.logout(session.session_id).await {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(json!({ "success": true })))
}

async fn current_session(
    State(services): State<Services>,
    headers: HeaderMap,
) -> Result<Json<UserSession>, ApiError> {
    Ok(Json(require_session(&services, &headers).await?))
}
