//! SSN (Superintendencia de Seguros de la Nación) integration
//!
//! This module provides:
//! - Wire types for the SSN login and filing endpoints
//! - A mock and an HTTP client behind one trait
//! - Expiration timestamp normalization
//! - The two-tier token cache
//! - The session service that hands out valid tokens

pub mod client;
pub mod expiration;
pub mod service;
pub mod token_cache;
pub mod types;

pub use client::{build_client, AuthorityClient, HttpAuthorityClient, MockAuthorityClient};
pub use expiration::{expiration_instant, normalize_expiration};
pub use service::AuthorityService;
pub use token_cache::{
    AuthorityToken, DurableTokenStore, FastTokenStore, MemoryTokenHistory, MemoryTtlStore,
    TokenCache,
};
pub use types::*;
