//! SSN holdings filings
//!
//! Core of an application that prepares and submits insurance holdings
//! filings ("presentaciones") to the Argentine insurance regulator (SSN):
//!
//! - [`presentation`]: filing records, the eligibility window and the audited
//!   lifecycle state machine
//! - [`authority`]: regulator client (mock or HTTP), token expiration parsing
//!   and the two-tier token cache
//! - [`submission`]: sends filings and rectification requests to the SSN
//! - [`session`]: application login that opportunistically opens a
//!   regulator session without depending on it
//! - [`audit`]: append-only activity log
//!
//! Postgres backends live behind the `database` feature and the REST API
//! behind the `server` feature.

pub mod app;
pub mod audit;
pub mod authority;
pub mod clock;
pub mod config;
pub mod error;
pub mod presentation;
pub mod session;
pub mod submission;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "server")]
pub mod api;

pub use app::{Backends, Services};
pub use config::AppConfig;
pub use error::{FilingError, LoginError, StoreError};
