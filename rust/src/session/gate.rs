//! Login gate
//!
//! On a credential match the gate times one regulator login with the
//! application credentials. Whatever happens there is folded into an
//! [`AuthoritySessionResult`]; the human login succeeds either way.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{AuthorityConnection, CredentialVerifier, SessionStore, UserSession};
use crate::audit::{self, modules, ActivityLog, ActivityLogEntry};
use crate::authority::{AuthorityService, AuthorityToken};
use crate::clock::SharedClock;
use crate::error::LoginError;

/// Where the client goes after logging in
pub const HOME_PATH: &str = "/home";

/// Outcome of the regulator login attempted during an application login
#[derive(Debug, Clone)]
pub enum AuthoritySessionResult {
    Connected {
        token: AuthorityToken,
        elapsed_ms: u64,
    },
    Failed {
        reason: String,
        elapsed_ms: u64,
    },
}

impl AuthoritySessionResult {
    pub fn is_connected(&self) -> bool {
        matches!(self, AuthoritySessionResult::Connected { .. })
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            AuthoritySessionResult::Connected { elapsed_ms, .. }
            | AuthoritySessionResult::Failed { elapsed_ms, .. } => *elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Warning,
}

/// One-shot message shown after the redirect
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: UserSession,
    pub authority: AuthoritySessionResult,
    pub flash: Flash,
    pub redirect: &'static str,
}

pub struct SessionGate {
    verifier: Arc<dyn CredentialVerifier>,
    authority: Arc<AuthorityService>,
    audit: Arc<dyn ActivityLog>,
    sessions: SessionStore,
    clock: SharedClock,
}

impl SessionGate {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        authority: Arc<AuthorityService>,
        audit: Arc<dyn ActivityLog>,
        sessions: SessionStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            verifier,
            authority,
            audit,
            sessions,
            clock,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, LoginError> {
        let now = self.clock.now();
        let user = match self.verifier.verify(username, password).await? {
            Some(user) => user,
            None => {
                tracing::warn!("Rejected login for '{}'", username);
                audit::record(
                    self.audit.as_ref(),
                    ActivityLogEntry::new(
                        modules::AUTH,
                        "login_failed",
                        audit::ActivityCategory::Warning,
                    )
                    .at(now)
                    .with_metadata(json!({ "username": username })),
                )
                .await;
                return Err(LoginError::InvalidCredentials);
            }
        };

        let authority = self.connect_authority().await;

        let session = UserSession {
            session_id: Uuid::new_v4(),
            user: user.clone(),
            logged_in_at: now,
            authority: match &authority {
                AuthoritySessionResult::Connected { token, elapsed_ms } => {
                    Some(AuthorityConnection {
                        token_preview: token.masked(),
                        expiration: token.expiration.clone(),
                        mock: token.is_mock,
                        connected_at: self.clock.now(),
                        elapsed_ms: *elapsed_ms,
                    })
                }
                AuthoritySessionResult::Failed { .. } => None,
            },
        };
        self.sessions
            .write()
            .await
            .insert(session.session_id, session.clone());

        audit::record(
            self.audit.as_ref(),
            ActivityLogEntry::info(modules::AUTH, "login")
                .by(Some(user.user_id))
                .at(now)
                .with_metadata(json!({
                    "username": user.username,
                    "session_id": session.session_id,
                })),
        )
        .await;

        let connection_entry = match &authority {
            AuthoritySessionResult::Connected { token, elapsed_ms } => {
                ActivityLogEntry::info(modules::SSN, "connection_success").with_metadata(json!({
                    "elapsed_ms": elapsed_ms,
                    "mock": token.is_mock,
                    "expiration": token.expiration,
                }))
            }
            AuthoritySessionResult::Failed { reason, elapsed_ms } => {
                ActivityLogEntry::error(modules::SSN, "connection_failed").with_metadata(json!({
                    "elapsed_ms": elapsed_ms,
                    "reason": reason,
                }))
            }
        };
        audit::record(
            self.audit.as_ref(),
            connection_entry.by(Some(user.user_id)).at(self.clock.now()),
        )
        .await;

        let flash = match &authority {
            AuthoritySessionResult::Connected { token, .. } => Flash {
                level: FlashLevel::Success,
                message: if token.is_mock {
                    format!("Welcome {}. Connected to SSN (mock mode).", user.username)
                } else {
                    format!("Welcome {}. Connected to SSN.", user.username)
                },
            },
            AuthoritySessionResult::Failed { .. } => Flash {
                level: FlashLevel::Warning,
                message: format!(
                    "Welcome {}. Could not connect to SSN; some functions may be limited.",
                    user.username
                ),
            },
        };

        tracing::info!(
            "User {} logged in (SSN connected: {}, {} ms)",
            user.username,
            authority.is_connected(),
            authority.elapsed_ms()
        );

        Ok(LoginOutcome {
            session,
            authority,
            flash,
            redirect: HOME_PATH,
        })
    }

    async fn connect_authority(&self) -> AuthoritySessionResult {
        let started = Instant::now();
        let result = self.authority.authenticate().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(token) => AuthoritySessionResult::Connected { token, elapsed_ms },
            Err(e) => {
                tracing::warn!("SSN connection at login failed after {} ms: {}", elapsed_ms, e);
                AuthoritySessionResult::Failed {
                    reason: e.to_string(),
                    elapsed_ms,
                }
            }
        }
    }

    /// End a session. Returns false for an unknown id.
    pub async fn logout(&self, session_id: Uuid) -> bool {
        let Some(session) = self.sessions.write().await.remove(&session_id) else {
            return false;
        };
        self.authority.clear().await;

        audit::record(
            self.audit.as_ref(),
            ActivityLogEntry::info(modules::AUTH, "logout")
                .by(Some(session.user.user_id))
                .at(self.clock.now())
                .with_metadata(json!({ "session_id": session_id })),
        )
        .await;
        tracing::info!("User {} logged out", session.user.username);
        true
    }

    pub async fn session(&self, session_id: Uuid) -> Option<UserSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub fn authority(&self) -> &Arc<AuthorityService> {
        &self.authority
    }
}
