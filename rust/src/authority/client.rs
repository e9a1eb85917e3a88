//! SSN API client
//!
//! Two implementations behind [`AuthorityClient`]: a mock that answers from
//! configuration, and the HTTP client for the real regulator. Which one runs
//! is decided once, in [`build_client`].
//!
//! `authenticate` never fails loudly: any problem is logged and turns into
//! `None`. Filing calls return [`AuthorityCallError`] so the caller can audit
//! the raw failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use super::types::*;
use crate::config::{AuthorityConfig, AuthorityCredentials};
use crate::error::AuthorityCallError;
use crate::presentation::DeliveryKind;

const LOGGED_BODY_CHARS: usize = 200;

#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Whether responses are synthesized locally
    fn is_mock(&self) -> bool;

    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Option<AuthorityLogin>;

    async fn submit_filing(
        &self,
        token: &str,
        filing: &FilingPayload,
    ) -> Result<RegulatorReceipt, AuthorityCallError>;

    async fn request_rectification(
        &self,
        token: &str,
        request: &RectificationRequest,
    ) -> Result<RegulatorReceipt, AuthorityCallError>;
}

/// Pick the client implementation the configuration asks for
pub fn build_client(config: &AuthorityConfig) -> Result<Arc<dyn AuthorityClient>> {
    if config.mock_enabled {
        tracing::info!("SSN client running in mock mode");
        Ok(Arc::new(MockAuthorityClient::new(
            config.mock_token.clone(),
            config.mock_expiration.clone(),
        )))
    } else {
        tracing::info!(
            "SSN client targeting {} ({})",
            config.base_url,
            config.environment
        );
        Ok(Arc::new(HttpAuthorityClient::new(config.clone())?))
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Answers every call successfully from fixed configuration
#[derive(Debug, Clone)]
pub struct MockAuthorityClient {
    token: String,
    expiration: String,
}

impl MockAuthorityClient {
    pub fn new(token: impl Into<String>, expiration: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expiration: expiration.into(),
        }
    }

    fn receipt(kind: &str, body: JsonValue) -> RegulatorReceipt {
        let id = format!("MOCK-{}", Uuid::new_v4().simple());
        RegulatorReceipt {
            response_id: id.clone(),
            payload: json!({ "id": id, "mock": true, "operation": kind, "request": body }),
        }
    }
}

#[async_trait]
impl AuthorityClient for MockAuthorityClient {
    fn is_mock(&self) -> bool {
        true
    }

    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Option<AuthorityLogin> {
        tracing::debug!(
            "Mock SSN login for user {} / company {}",
            credentials.username,
            credentials.company_id
        );
        Some(AuthorityLogin {
            token: self.token.clone(),
            expiration: self.expiration.clone(),
            success: true,
            mock: true,
        })
    }

    async fn submit_filing(
        &self,
        _token: &str,
        filing: &FilingPayload,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        let body = serde_json::to_value(filing)
            .map_err(|e| AuthorityCallError::Malformed(e.to_string()))?;
        Ok(Self::receipt("entrega", body))
    }

    async fn request_rectification(
        &self,
        _token: &str,
        request: &RectificationRequest,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        let body = serde_json::to_value(request)
            .map_err(|e| AuthorityCallError::Malformed(e.to_string()))?;
        Ok(Self::receipt("rectificacion", body))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Client for the real SSN endpoints
pub struct HttpAuthorityClient {
    http: Client,
    config: AuthorityConfig,
}

impl HttpAuthorityClient {
    pub fn new(config: AuthorityConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, config })
    }

    fn filing_url(&self, kind: DeliveryKind) -> String {
        let endpoint = match kind {
            DeliveryKind::Monthly => &self.config.monthly_endpoint,
            DeliveryKind::Weekly => &self.config.weekly_endpoint,
        };
        self.config.endpoint_url(endpoint)
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: &B,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        let response = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::error!("SSN call to {} timed out", url);
                } else {
                    tracing::error!("SSN call to {} failed: {}", url, e);
                }
                AuthorityCallError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthorityCallError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(
                "SSN rejected call to {} with {}: {}",
                url,
                status,
                truncate(&text)
            );
            return Err(AuthorityCallError::Rejected {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }

        let payload: JsonValue = serde_json::from_str(&text).map_err(|e| {
            AuthorityCallError::Malformed(format!("{}. Body: {}", e, truncate(&text)))
        })?;

        RegulatorReceipt::from_body(payload).ok_or_else(|| {
            AuthorityCallError::Malformed(format!(
                "no presentation id in response: {}",
                truncate(&text)
            ))
        })
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    fn is_mock(&self) -> bool {
        false
    }

    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Option<AuthorityLogin> {
        let url = self.config.endpoint_url(&self.config.auth_endpoint);
        let body = LoginRequest {
            user: &credentials.username,
            cia: &credentials.company_id,
            password: &credentials.password,
        };

        let response = match self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("SSN authentication request to {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "SSN authentication rejected with {}: {}",
                status,
                truncate(&text)
            );
            return None;
        }

        let parsed: LoginResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("SSN authentication response not understood: {}", e);
                return None;
            }
        };

        if parsed.token.trim().is_empty() {
            tracing::warn!("SSN authentication returned an empty token");
            return None;
        }

        Some(AuthorityLogin {
            token: parsed.token,
            expiration: parsed.fecha_expiracion.unwrap_or_default(),
            success: true,
            mock: false,
        })
    }

    async fn submit_filing(
        &self,
        token: &str,
        filing: &FilingPayload,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        let url = self.filing_url(filing.kind);
        tracing::info!(
            "Submitting {} filing {} for company {} to {}",
            filing.kind,
            filing.cronograma,
            filing.codigo_compania,
            url
        );
        self.call(Method::POST, &url, token, filing).await
    }

    async fn request_rectification(
        &self,
        token: &str,
        request: &RectificationRequest,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        let url = self.filing_url(request.kind);
        tracing::info!(
            "Requesting rectification of {} filing {} for company {}",
            request.kind,
            request.cronograma,
            request.codigo_compania
        );
        self.call(Method::PUT, &url, token, request).await
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(LOGGED_BODY_CHARS).collect()
}
