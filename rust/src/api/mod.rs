//! REST API
//!
//! Session endpoints:
//! - POST   /api/login                 - Log in (and try to open an SSN session)
//! - POST   /api/logout                - End the session
//! - GET    /api/session               - Current session
//!
//! Presentation endpoints:
//! - GET    /api/periods/eligible      - Periods open for filing
//! - GET    /api/presentations         - List (filters: company_code, kind, status)
//! - POST   /api/presentations         - Create
//! - GET    /api/presentations/:id     - Show
//! - DELETE /api/presentations/:id     - Delete (before submission only)
//! - POST   /api/presentations/:id/process
//! - POST   /api/presentations/monthly/:id/submit
//! - POST   /api/presentations/weekly/:id/submit
//! - POST   /api/presentations/:id/rectification
//! - POST   /api/presentations/:id/rectification/resolve
//!
//! Regulator endpoints:
//! - GET    /api/authority/status      - Cached SSN token status
//! - GET    /api/health                - Health check
//!
//! Authenticated endpoints read the session id from the `x-session-id` header.

pub mod auth_routes;
pub mod authority_routes;
pub mod error;
pub mod presentation_routes;

use axum::{http::HeaderMap, Router};
use uuid::Uuid;

use crate::app::Services;
use crate::session::UserSession;

pub use error::ApiError;

pub const SESSION_HEADER: &str = "x-session-id";

pub fn create_router(services: Services) -> Router {
    Router::new()
        .merge(auth_routes::routes())
        .merge(presentation_routes::routes())
        .merge(authority_routes::routes())
        .with_state(services)
}

/// Resolve the caller's session from the request headers
pub(crate) async fn require_session(
    services: &Services,
    headers: &HeaderMap,
) -> Result<UserSession, ApiError> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;

    services
        .gate
        .session(session_id)
        .await
        .ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::app::Backends;
    use crate::clock::{FixedClock, SharedClock};
    use crate::config::AppConfig;
    use crate::session::hash_password;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value as JsonValue};
    use std::sync::Arc;
    use tower::ServiceExt;

    pub(crate) fn services() -> Services {
        let digest = hash_password("s3creto");
        let config = AppConfig::from_lookup(|key| match key {
            "SSN_MOCK_ENABLED" => Some("true".to_string()),
            "APP_USERS" => Some(format!("operador:{}", digest)),
            _ => None,
        })
        .unwrap();
        let clock: SharedClock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 2, 12, 13, 0, 0).unwrap(),
        ));
        Services::build(&config, Backends::in_memory(), clock).unwrap()
    }

    pub(crate) async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        session: Option<Uuid>,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Router plus a logged-in session id
    pub(crate) async fn logged_in() -> (Router, Uuid) {
        let app = create_router(services());
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "operador", "password": "s3creto" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let id = Uuid::parse_str(body["session_id"].as_str().unwrap()).unwrap();
        (app, id)
    }
}
