//! Postgres activity log

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::audit::{ActivityCategory, ActivityLog, ActivityLogEntry};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgActivityLog {
    pool: PgPool,
}

impl PgActivityLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ssn.activity_log
                (entry_id, user_id, action, module, category, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.module)
        .bind(entry.category.as_str())
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, user_id, action, module, category, metadata, created_at
            FROM ssn.activity_log
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ActivityLogEntry, StoreError> {
                let category: String = row.try_get("category")?;
                Ok(ActivityLogEntry {
                    entry_id: row.try_get("entry_id")?,
                    user_id: row.try_get("user_id")?,
                    action: row.try_get("action")?,
                    module: row.try_get("module")?,
                    category: ActivityCategory::parse(&category),
                    metadata: row.try_get("metadata")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
