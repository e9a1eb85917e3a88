//! Service wiring
//!
//! Builds the long-lived services from configuration and a set of storage
//! backends. The HTTP layer and the integration tests both start here.

use anyhow::Result;
use std::sync::Arc;

use crate::audit::{ActivityLog, MemoryActivityLog};
use crate::authority::{
    build_client, AuthorityClient, AuthorityService, DurableTokenStore, MemoryTokenHistory,
    MemoryTtlStore, TokenCache,
};
use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::presentation::{MemoryPresentationStore, PresentationLifecycle, PresentationStore};
use crate::session::{create_session_store, CredentialVerifier, SessionGate, StaticCredentialVerifier};
use crate::submission::SubmissionCoordinator;

/// Storage behind the services
pub struct Backends {
    pub presentations: Arc<dyn PresentationStore>,
    pub token_history: Arc<dyn DurableTokenStore>,
    pub activity: Arc<dyn ActivityLog>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            presentations: Arc::new(MemoryPresentationStore::new()),
            token_history: Arc::new(MemoryTokenHistory::new()),
            activity: Arc::new(MemoryActivityLog::new()),
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(db: &crate::database::DatabaseManager) -> Self {
        Self {
            presentations: Arc::new(db.presentation_store()),
            token_history: Arc::new(db.token_history()),
            activity: Arc::new(db.activity_log()),
        }
    }
}

#[derive(Clone)]
pub struct Services {
    pub authority: Arc<AuthorityService>,
    pub lifecycle: Arc<PresentationLifecycle>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub gate: Arc<SessionGate>,
    pub activity: Arc<dyn ActivityLog>,
}

impl Services {
    /// Wire everything, picking the regulator client from configuration
    pub fn build(config: &AppConfig, backends: Backends, clock: SharedClock) -> Result<Self> {
        let client = build_client(&config.authority)?;
        let verifier = Arc::new(StaticCredentialVerifier::new(&config.users));
        if verifier.is_empty() {
            tracing::warn!("No application users configured (APP_USERS); nobody can log in");
        }
        Ok(Self::assemble(config, backends, clock, client, verifier))
    }

    /// Wire everything around explicit collaborators
    pub fn assemble(
        config: &AppConfig,
        backends: Backends,
        clock: SharedClock,
        client: Arc<dyn AuthorityClient>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let cache = Arc::new(TokenCache::new(
            Arc::new(MemoryTtlStore::new()),
            backends.token_history,
            clock.clone(),
        ));
        let authority = Arc::new(AuthorityService::new(client, cache, &config.authority));

        let lifecycle = Arc::new(
            PresentationLifecycle::new(
                backends.presentations,
                backends.activity.clone(),
                clock.clone(),
            )
            .with_utc_offset(config.authority.utc_offset),
        );
        let coordinator = Arc::new(SubmissionCoordinator::new(
            lifecycle.clone(),
            authority.clone(),
        ));
        let gate = Arc::new(SessionGate::new(
            verifier,
            authority.clone(),
            backends.activity.clone(),
            create_session_store(),
            clock,
        ));

        Self {
            authority,
            lifecycle,
            coordinator,
            gate,
            activity: backends.activity,
        }
    }
}
