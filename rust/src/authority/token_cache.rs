//! Two-tier cache for the regulator session token
//!
//! The fast tier is an expiring key/value store; the durable tier keeps every
//! token ever issued together with its own expiry, so a valid token survives a
//! flush of the fast tier. `clear()` only touches the fast tier.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::SharedClock;
use crate::error::StoreError;

/// Key under which the application token lives in the fast tier
pub const TOKEN_CACHE_KEY: &str = "ssn_token";

/// The process-wide regulator credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityToken {
    pub token: String,
    /// Absolute expiry, `None` when the regulator's timestamp was not understood
    pub expires_at: Option<DateTime<Utc>>,
    /// Expiration as stored for display (`DD/MM/YYYY HH:MM:SS`, or raw if unparsed)
    pub expiration: String,
    pub is_mock: bool,
    pub username: String,
    pub company_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuthorityToken {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    /// Remaining lifetime; `None` when unknown or already expired
    pub fn ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at - now)
            .filter(|ttl| *ttl > Duration::zero())
    }

    /// Token with everything but the edges hidden, for logs and status pages
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

/// Fast, expiring tier
#[async_trait]
pub trait FastTokenStore: Send + Sync {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<AuthorityToken>, StoreError>;
    async fn set(
        &self,
        key: &str,
        token: &AuthorityToken,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Durable history of issued tokens
#[async_trait]
pub trait DurableTokenStore: Send + Sync {
    async fn save(&self, token: &AuthorityToken) -> Result<(), StoreError>;

    /// Most recently issued token that is still live at `now`
    async fn latest_valid(&self, now: DateTime<Utc>) -> Result<Option<AuthorityToken>, StoreError>;

    /// Issued tokens, newest first
    async fn history(&self, limit: usize) -> Result<Vec<AuthorityToken>, StoreError>;
}

/// In-process TTL map used as the fast tier
#[derive(Default)]
pub struct MemoryTtlStore {
    entries: RwLock<HashMap<String, (AuthorityToken, DateTime<Utc>)>>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FastTokenStore for MemoryTtlStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<AuthorityToken>, StoreError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((token, deadline)) if *deadline > now => return Ok(Some(token.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }
        // expired: evict
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        token: &AuthorityToken,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (token.clone(), now + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// In-memory durable tier (tests, and servers running without a database)
#[derive(Default)]
pub struct MemoryTokenHistory {
    tokens: RwLock<Vec<AuthorityToken>>,
}

impl MemoryTokenHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableTokenStore for MemoryTokenHistory {
    async fn save(&self, token: &AuthorityToken) -> Result<(), StoreError> {
        self.tokens.write().await.push(token.clone());
        Ok(())
    }

    async fn latest_valid(&self, now: DateTime<Utc>) -> Result<Option<AuthorityToken>, StoreError> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .iter()
            .filter(|t| t.is_live(now))
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn history(&self, limit: usize) -> Result<Vec<AuthorityToken>, StoreError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.iter().rev().take(limit).cloned().collect())
    }
}

/// Outcome of [`TokenCache::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub cached: bool,
    pub ttl_secs: Option<i64>,
}

/// The shared token cache
pub struct TokenCache {
    fast: Arc<dyn FastTokenStore>,
    durable: Arc<dyn DurableTokenStore>,
    clock: SharedClock,
}

impl TokenCache {
    pub fn new(
        fast: Arc<dyn FastTokenStore>,
        durable: Arc<dyn DurableTokenStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            fast,
            durable,
            clock,
        }
    }

    /// In-memory tiers on both levels
    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(
            Arc::new(MemoryTtlStore::new()),
            Arc::new(MemoryTokenHistory::new()),
            clock,
        )
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// A valid token, or `None`.
    ///
    /// Store failures degrade to `None` so the caller simply re-authenticates.
    pub async fn get(&self) -> Option<AuthorityToken> {
        let now = self.clock.now();

        match self.fast.get(TOKEN_CACHE_KEY, now).await {
            Ok(Some(token)) => return Some(token),
            Ok(None) => {}
            Err(e) => tracing::warn!("Fast token tier unavailable: {}", e),
        }

        let token = match self.durable.latest_valid(now).await {
            Ok(token) => token?,
            Err(e) => {
                tracing::warn!("Durable token tier unavailable: {}", e);
                return None;
            }
        };

        if let Some(ttl) = token.ttl(now) {
            if let Err(e) = self.fast.set(TOKEN_CACHE_KEY, &token, ttl, now).await {
                tracing::warn!("Failed to repopulate fast token tier: {}", e);
            } else {
                tracing::debug!("Fast token tier repopulated from durable store");
            }
        }

        Some(token)
    }

    /// Store a token. The fast tier is only written for a strictly positive
    /// TTL; the durable tier is always written.
    pub async fn put(&self, token: &AuthorityToken) -> Result<PutOutcome, StoreError> {
        let now = self.clock.now();
        let ttl = token.expires_at.map(|expires_at| expires_at - now);

        let mut cached = false;
        match ttl {
            Some(ttl) if ttl > Duration::zero() => {
                match self.fast.set(TOKEN_CACHE_KEY, token, ttl, now).await {
                    Ok(()) => cached = true,
                    Err(e) => tracing::warn!("Failed to write fast token tier: {}", e),
                }
            }
            Some(ttl) => tracing::warn!(
                "Regulator token already expired ({}s), not caching",
                ttl.num_seconds()
            ),
            None => tracing::warn!(
                "Regulator token expiration '{}' not understood, TTL unknown",
                token.expiration
            ),
        }

        self.durable.save(token).await?;

        Ok(PutOutcome {
            cached,
            ttl_secs: ttl.map(|t| t.num_seconds()),
        })
    }

    /// Drop the fast-tier entry; durable history is kept
    pub async fn clear(&self) {
        if let Err(e) = self.fast.remove(TOKEN_CACHE_KEY).await {
            tracing::warn!("Failed to clear fast token tier: {}", e);
        }
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<AuthorityToken>, StoreError> {
        self.durable.history(limit).await
    }
}
