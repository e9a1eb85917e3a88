//! Application sessions
//!
//! Staff log in against a [`CredentialVerifier`]; on success the
//! [`SessionGate`] also tries to open a regulator session. The two are
//! independent: a regulator outage never blocks an application login.

pub mod credentials;
pub mod gate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use credentials::{hash_password, user_id_for, CredentialVerifier, StaticCredentialVerifier};
pub use gate::{AuthoritySessionResult, Flash, FlashLevel, LoginOutcome, SessionGate};

/// An authenticated application user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub user_id: Uuid,
    pub username: String,
}

/// Regulator connection details kept on the session for display.
///
/// The token cache stays the source of truth for the token itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConnection {
    pub token_preview: String,
    pub expiration: String,
    pub mock: bool,
    pub connected_at: DateTime<Utc>,
    /// Time the regulator login took
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: Uuid,
    pub user: AppUser,
    pub logged_in_at: DateTime<Utc>,
    pub authority: Option<AuthorityConnection>,
}

/// In-memory store for application sessions
pub type SessionStore = Arc<RwLock<HashMap<Uuid, UserSession>>>;

pub fn create_session_store() -> SessionStore {
    Arc::new(RwLock::new(HashMap::new()))
}
