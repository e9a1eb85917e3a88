//! Database connection and management module
//!
//! Postgres backends for the presentation store, the durable token tier and
//! the activity log, plus pool management and schema setup.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

mod activity_repository;
mod presentation_repository;
mod token_repository;

pub use activity_repository::PgActivityLog;
pub use presentation_repository::PgPresentationStore;
pub use token_repository::PgTokenHistory;

const SCHEMA_SQL: &str = include_str!("../../migrations/001_ssn_filings.sql");

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Create a new database manager with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "Connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    pub fn presentation_store(&self) -> PgPresentationStore {
        PgPresentationStore::new(self.pool.clone())
    }

    pub fn token_history(&self) -> PgTokenHistory {
        PgTokenHistory::new(self.pool.clone())
    }

    pub fn activity_log(&self) -> PgActivityLog {
        PgActivityLog::new(self.pool.clone())
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    /// Create the schema and tables when missing. Safe to run repeatedly.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        info!("Applying SSN filings schema");
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        info!("Database schema verification complete");
        Ok(())
    }
}

/// Mask sensitive information in database URL for logging
pub fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else if url.chars().count() > 20 {
        let chars: Vec<char> = url.chars().collect();
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}
