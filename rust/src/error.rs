//! Error types for the filing core
//!
//! `FilingError` is what the lifecycle and the submission coordinator hand back
//! to callers. Lower layers (stores, the regulator client, configuration) have
//! their own enums and are folded into `FilingError` at the service boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::presentation::{DeliveryKind, PresentationStatus};

/// Typed failures of presentation operations
#[derive(Error, Debug)]
pub enum FilingError {
    #[error("A presentation for this period is already {status} and blocks a new filing")]
    BlockingDuplicate { status: PresentationStatus },

    #[error("A presentation for this period already exists with status {status}")]
    Duplicate { status: PresentationStatus },

    #[error("Cannot {action} a presentation in status {status}")]
    NotReady {
        action: &'static str,
        status: PresentationStatus,
    },

    #[error("Presentation is {actual}, but this operation only accepts {expected} deliveries")]
    WrongKind {
        expected: DeliveryKind,
        actual: DeliveryKind,
    },

    #[error("Cannot reach the regulator right now, please try again later")]
    AuthorityUnavailable,

    #[error("The regulator rejected the request: {detail}")]
    AuthorityRejected { status: Option<u16>, detail: String },

    /// The call did not complete (timeout, connection, unreadable answer).
    /// `detail` is kept for logs and audit only.
    #[error("The regulator could not process the request, please try again later")]
    AuthorityFailed { detail: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Presentation {0} not found")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FilingError {
    /// Stable machine-readable code, used by audit metadata and API payloads
    pub fn code(&self) -> &'static str {
        match self {
            FilingError::BlockingDuplicate { .. } => "blocking_duplicate",
            FilingError::Duplicate { .. } => "duplicate",
            FilingError::NotReady { .. } => "not_ready",
            FilingError::WrongKind { .. } => "wrong_kind",
            FilingError::AuthorityUnavailable => "authority_unavailable",
            FilingError::AuthorityRejected { .. } => "authority_rejected",
            FilingError::AuthorityFailed { .. } => "authority_failed",
            FilingError::Validation(_) => "validation",
            FilingError::NotFound(_) => "not_found",
            FilingError::Storage(_) => "storage",
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Storage faults are collapsed so internals do not leak.
    pub fn user_message(&self) -> String {
        match self {
            FilingError::Storage(_) => "An internal error occurred, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for FilingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => FilingError::NotFound(id),
            other => FilingError::Storage(other.to_string()),
        }
    }
}

/// Errors raised by persistence backends (memory or Postgres)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Record {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_error) = error {
            if db_error.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation(db_error.message().to_string());
            }
        }
        StoreError::Database(error.to_string())
    }
}

/// Failures of a single regulator call.
///
/// Authentication never produces one of these (it degrades to `None`); filing
/// submissions and rectification requests do.
#[derive(Error, Debug, Clone)]
pub enum AuthorityCallError {
    #[error("Regulator responded {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Malformed regulator response: {0}")]
    Malformed(String),
}

impl AuthorityCallError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthorityCallError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<AuthorityCallError> for FilingError {
    fn from(error: AuthorityCallError) -> Self {
        match error {
            AuthorityCallError::Rejected { status, .. } => FilingError::AuthorityRejected {
                status: Some(status),
                detail: error.to_string(),
            },
            AuthorityCallError::Transport(_) | AuthorityCallError::Malformed(_) => {
                FilingError::AuthorityFailed {
                    detail: error.to_string(),
                }
            }
        }
    }
}

/// Failures while obtaining a regulator session
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("The regulator did not grant a session")]
    Unavailable,

    #[error("Failed to cache regulator token: {0}")]
    TokenStore(#[from] StoreError),
}

/// Login failures surfaced to the human user
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid authority environment: {0}. Must be one of: testing, production")]
    InvalidEnvironment(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_duplicate_names_status() {
        let err = FilingError::BlockingDuplicate {
            status: PresentationStatus::Submitted,
        };
        assert!(err.to_string().contains("PRESENTADO"));
        assert_eq!(err.code(), "blocking_duplicate");
    }

    #[test]
    fn test_authority_unavailable_is_generic() {
        let msg = FilingError::AuthorityUnavailable.user_message();
        assert!(msg.contains("regulator"));
        assert!(!msg.to_lowercase().contains("token"));
    }

    #[test]
    fn test_storage_error_message_hides_detail() {
        let err = FilingError::Storage("connection refused on 10.0.0.3".to_string());
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_call_error_maps_to_rejected() {
        let err: FilingError = AuthorityCallError::Rejected {
            status: 422,
            body: "cronograma invalido".to_string(),
        }
        .into();
        match err {
            FilingError::AuthorityRejected { status, detail } => {
                assert_eq!(status, Some(422));
                assert!(detail.contains("cronograma invalido"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transport_failure_hides_regulator_url() {
        let err: FilingError = AuthorityCallError::Transport(
            "error sending request for url (https://10.9.8.7/api/inv/entregaMensual): operation timed out"
                .to_string(),
        )
        .into();
        assert_eq!(err.code(), "authority_failed");
        let msg = err.user_message();
        assert!(!msg.contains("10.9.8.7"));
        assert!(!msg.to_lowercase().contains("rejected"));

        let err: FilingError = AuthorityCallError::Malformed("<html>".to_string()).into();
        assert!(matches!(err, FilingError::AuthorityFailed { .. }));
        assert!(!err.user_message().contains("<html>"));
    }
}
