//! Durable tier of the regulator token cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::authority::{AuthorityToken, DurableTokenStore};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgTokenHistory {
    pool: PgPool,
}

impl PgTokenHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<AuthorityToken, StoreError> {
        Ok(AuthorityToken {
            token: row.try_get("token")?,
            expires_at: row.try_get("expires_at")?,
            expiration: row.try_get("expiration")?,
            is_mock: row.try_get("is_mock")?,
            username: row.try_get("username")?,
            company_id: row.try_get("company_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl DurableTokenStore for PgTokenHistory {
    async fn save(&self, token: &AuthorityToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ssn.tokens
                (token, expires_at, expiration, is_mock, username, company_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(&token.expiration)
        .bind(token.is_mock)
        .bind(&token.username)
        .bind(&token.company_id)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_valid(&self, now: DateTime<Utc>) -> Result<Option<AuthorityToken>, StoreError> {
        sqlx::query(
            r#"
            SELECT token, expires_at, expiration, is_mock, username, company_id, created_at
            FROM ssn.tokens
            WHERE expires_at > $1
            ORDER BY created_at DESC, token_id DESC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::from_row)
        .transpose()
    }

    async fn history(&self, limit: usize) -> Result<Vec<AuthorityToken>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT token, expires_at, expiration, is_mock, username, company_id, created_at
            FROM ssn.tokens
            ORDER BY created_at DESC, token_id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }
}
