//! Regulator status and health

use axum::{extract::State, http::HeaderMap, response::Json, routing::get, Router};
use serde::Serialize;

use super::{require_session, ApiError};
use crate::app::Services;

#[derive(Debug, Serialize)]
pub struct AuthorityStatus {
    pub mock: bool,
    pub connected: bool,
    /// Masked token, never the full value
    pub token: Option<String>,
    pub expiration: Option<String>,
    pub username: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn routes() -> Router<Services> {
    Router::new()
        .route("/api/authority/status", get(authority_status))
        .route("/api/health", get(health_check))
}

async fn authority_status(
    State(services): State<Services>,
    headers: HeaderMap,
) -> Result<Json<AuthorityStatus>, ApiError> {
    require_session(&services, &headers).await?;
    let current = services.authority.current().await;

    Ok(Json(AuthorityStatus {
        mock: services.authority.client().is_mock(),
        connected: current.is_some(),
        token: current.as_ref().map(|t| t.masked()),
        expiration: current.as_ref().map(|t| t.expiration.clone()),
        username: current.as_ref().map(|t| t.username.clone()),
        company_id: current.map(|t| t.company_id),
    }))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
