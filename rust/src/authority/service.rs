//! Regulator session management
//!
//! [`AuthorityService`] is the single entry point for "give me a usable SSN
//! token". It owns the client, the two-tier cache and the application
//! credentials, and serialises refreshes so concurrent requests that find the
//! cache empty trigger one login between them.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::client::AuthorityClient;
use super::expiration::{expiration_instant, normalize_expiration};
use super::token_cache::{AuthorityToken, TokenCache};
use super::types::AuthorityLogin;
use crate::config::{AuthorityConfig, AuthorityCredentials};
use crate::error::AuthorityError;

pub struct AuthorityService {
    client: Arc<dyn AuthorityClient>,
    cache: Arc<TokenCache>,
    credentials: AuthorityCredentials,
    utc_offset: chrono::FixedOffset,
    refresh_lock: Mutex<()>,
}

impl AuthorityService {
    pub fn new(
        client: Arc<dyn AuthorityClient>,
        cache: Arc<TokenCache>,
        config: &AuthorityConfig,
    ) -> Self {
        Self {
            client,
            cache,
            credentials: config.credentials.clone(),
            utc_offset: config.utc_offset,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &Arc<dyn AuthorityClient> {
        &self.client
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Log in with the application credentials and cache the result
    pub async fn authenticate(&self) -> Result<AuthorityToken, AuthorityError> {
        let login = self
            .client
            .authenticate(&self.credentials)
            .await
            .filter(|login| login.success)
            .ok_or(AuthorityError::Unavailable)?;

        self.cache_token(
            &login,
            &self.credentials.username,
            &self.credentials.company_id,
        )
        .await
    }

    /// Normalize the expiration, compute the TTL and store the token.
    ///
    /// The durable record is written even when the token is already expired
    /// or its expiration could not be read.
    pub async fn cache_token(
        &self,
        login: &AuthorityLogin,
        username: &str,
        company_id: &str,
    ) -> Result<AuthorityToken, AuthorityError> {
        let expiration = normalize_expiration(&login.expiration);
        let expires_at = expiration_instant(&expiration, self.utc_offset);

        let token = AuthorityToken {
            token: login.token.clone(),
            expires_at,
            expiration,
            is_mock: login.mock,
            username: username.to_string(),
            company_id: company_id.to_string(),
            created_at: self.cache.clock().now(),
        };

        let outcome = self.cache.put(&token).await?;
        tracing::info!(
            "SSN token stored (mock: {}, expires: {}, cached: {}, ttl: {:?}s)",
            token.is_mock,
            token.expiration,
            outcome.cached,
            outcome.ttl_secs
        );

        Ok(token)
    }

    /// A usable token: cached if possible, otherwise a fresh login
    pub async fn valid_token(&self) -> Result<AuthorityToken, AuthorityError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // someone may have refreshed while we waited
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        tracing::info!("No cached SSN token, authenticating");
        self.authenticate().await
    }

    /// Current cached token without triggering a login
    pub async fn current(&self) -> Option<AuthorityToken> {
        self.cache.get().await
    }

    pub async fn clear(&self) {
        self.cache.clear().await;
    }
}
