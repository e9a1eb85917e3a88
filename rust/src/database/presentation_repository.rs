//! Postgres presentation store
//!
//! Line items are kept as a JSONB array on the parent row, so they are
//! replaced and deleted together with it. The unique constraint on
//! (company_code, cronograma, delivery_kind) surfaces as
//! `StoreError::UniqueViolation`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::presentation::{
    DeliveryKind, Presentation, PresentationFilter, PresentationKey, PresentationStatus,
    PresentationStore, StockItem,
};

const COLUMNS: &str = r#"
    presentation_id, company_code, cronograma, delivery_kind, status, original_file,
    response_id, response_payload, presented_at, notes, owner_id, items,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgPresentationStore {
    pool: PgPool,
}

impl PgPresentationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Presentation, StoreError> {
        let kind: String = row.try_get("delivery_kind")?;
        let status: String = row.try_get("status")?;
        let items: JsonValue = row.try_get("items")?;
        let items: Vec<StockItem> = serde_json::from_value(items)?;

        Ok(Presentation {
            presentation_id: row.try_get("presentation_id")?,
            company_code: row.try_get("company_code")?,
            cronograma: row.try_get("cronograma")?,
            kind: kind
                .parse::<DeliveryKind>()
                .map_err(|e| StoreError::Database(e.to_string()))?,
            status: status
                .parse::<PresentationStatus>()
                .map_err(|e| StoreError::Database(e.to_string()))?,
            original_file: row.try_get("original_file")?,
            response_id: row.try_get("response_id")?,
            response_payload: row.try_get("response_payload")?,
            presented_at: row.try_get("presented_at")?,
            notes: row.try_get("notes")?,
            owner_id: row.try_get("owner_id")?,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PresentationStore for PgPresentationStore {
    async fn insert(&self, p: &Presentation) -> Result<(), StoreError> {
        let items = serde_json::to_value(&p.items)?;
        sqlx::query(
            r#"
            INSERT INTO ssn.presentations (
                presentation_id, company_code, cronograma, delivery_kind, status,
                original_file, response_id, response_payload, presented_at, notes,
                owner_id, items, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(p.presentation_id)
        .bind(&p.company_code)
        .bind(&p.cronograma)
        .bind(p.kind.as_str())
        .bind(p.status.as_str())
        .bind(&p.original_file)
        .bind(&p.response_id)
        .bind(&p.response_payload)
        .bind(p.presented_at)
        .bind(&p.notes)
        .bind(p.owner_id)
        .bind(items)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Presentation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM ssn.presentations WHERE presentation_id = $1",
            COLUMNS
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::from_row)
            .transpose()
    }

    async fn find_by_key(
        &self,
        key: &PresentationKey,
    ) -> Result<Option<Presentation>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM ssn.presentations
            WHERE company_code = $1 AND cronograma = $2 AND delivery_kind = $3
            "#,
            COLUMNS
        );
        sqlx::query(&sql)
            .bind(&key.company_code)
            .bind(&key.cronograma)
            .bind(key.kind.as_str())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::from_row)
            .transpose()
    }

    async fn list(&self, filter: &PresentationFilter) -> Result<Vec<Presentation>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM ssn.presentations
            WHERE ($1::text IS NULL OR company_code = $1)
              AND ($2::text IS NULL OR delivery_kind = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY cronograma DESC, company_code
            "#,
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.company_code.as_deref())
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn update(&self, p: &Presentation) -> Result<(), StoreError> {
        let items = serde_json::to_value(&p.items)?;
        let result = sqlx::query(
            r#"
            UPDATE ssn.presentations
            SET status = $2,
                original_file = $3,
                response_id = $4,
                response_payload = $5,
                presented_at = $6,
                notes = $7,
                items = $8,
                updated_at = $9
            WHERE presentation_id = $1
            "#,
        )
        .bind(p.presentation_id)
        .bind(p.status.as_str())
        .bind(&p.original_file)
        .bind(&p.response_id)
        .bind(&p.response_payload)
        .bind(p.presented_at)
        .bind(&p.notes)
        .bind(items)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(p.presentation_id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ssn.presentations WHERE presentation_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
