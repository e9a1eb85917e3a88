//! Error responses for the REST API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::{FilingError, LoginError};

#[derive(Debug)]
pub enum ApiError {
    Filing(FilingError),
    Login(LoginError),
    Unauthorized,
    BadRequest(String),
}

impl From<FilingError> for ApiError {
    fn from(error: FilingError) -> Self {
        ApiError::Filing(error)
    }
}

impl From<LoginError> for ApiError {
    fn from(error: LoginError) -> Self {
        ApiError::Login(error)
    }
}

/// HTTP status for a filing error
pub fn filing_status(error: &FilingError) -> StatusCode {
    match error {
        FilingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FilingError::BlockingDuplicate { .. }
        | FilingError::Duplicate { .. }
        | FilingError::NotReady { .. } => StatusCode::CONFLICT,
        FilingError::WrongKind { .. } => StatusCode::BAD_REQUEST,
        FilingError::NotFound(_) => StatusCode::NOT_FOUND,
        FilingError::AuthorityUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FilingError::AuthorityRejected { .. } | FilingError::AuthorityFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        FilingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Filing(e) => (filing_status(e), e.code(), e.user_message()),
            ApiError::Login(e @ LoginError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", e.to_string())
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or unknown session".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
        };

        (
            status,
            Json(json!({
                "success": false,
                "error": code,
                "message": message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{DeliveryKind, PresentationStatus};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (FilingError::Validation("x".into()), 422),
            (
                FilingError::BlockingDuplicate {
                    status: PresentationStatus::Submitted,
                },
                409,
            ),
            (
                FilingError::WrongKind {
                    expected: DeliveryKind::Monthly,
                    actual: DeliveryKind::Weekly,
                },
                400,
            ),
            (FilingError::AuthorityUnavailable, 503),
            (
                FilingError::AuthorityRejected {
                    status: Some(500),
                    detail: "boom".into(),
                },
                502,
            ),
            (
                FilingError::AuthorityFailed {
                    detail: "timed out".into(),
                },
                502,
            ),
            (FilingError::Storage("db".into()), 500),
        ];
        for (error, expected) in cases {
            assert_eq!(filing_status(&error).as_u16(), expected, "{error}");
        }
    }
}
