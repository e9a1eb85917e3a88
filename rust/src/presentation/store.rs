//! Presentation persistence
//!
//! The store enforces one record per (company, period, kind). Callers get a
//! [`StoreError::UniqueViolation`] when an insert collides and are expected to
//! re-read the conflicting record to decide what to report.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{Presentation, PresentationFilter, PresentationKey};
use crate::error::StoreError;

#[async_trait]
pub trait PresentationStore: Send + Sync {
    /// Insert a new record, failing on a duplicate key
    async fn insert(&self, presentation: &Presentation) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Presentation>, StoreError>;

    async fn find_by_key(&self, key: &PresentationKey)
        -> Result<Option<Presentation>, StoreError>;

    /// Matching records, newest period first
    async fn list(&self, filter: &PresentationFilter) -> Result<Vec<Presentation>, StoreError>;

    /// Overwrite an existing record (status, items, response fields)
    async fn update(&self, presentation: &Presentation) -> Result<(), StoreError>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// In-memory presentation store
#[derive(Default, Clone)]
pub struct MemoryPresentationStore {
    records: Arc<RwLock<HashMap<Uuid, Presentation>>>,
}

impl MemoryPresentationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresentationStore for MemoryPresentationStore {
    async fn insert(&self, presentation: &Presentation) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let key = presentation.key();
        if records.values().any(|p| p.key() == key) {
            return Err(StoreError::UniqueViolation(format!(
                "{}/{}/{}",
                key.company_code, key.cronograma, key.kind
            )));
        }
        records.insert(presentation.presentation_id, presentation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Presentation>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_key(
        &self,
        key: &PresentationKey,
    ) -> Result<Option<Presentation>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|p| p.key() == *key)
            .cloned())
    }

    async fn list(&self, filter: &PresentationFilter) -> Result<Vec<Presentation>, StoreError> {
        let mut found: Vec<Presentation> = self
            .records
            .read()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.cronograma
                .cmp(&a.cronograma)
                .then_with(|| a.company_code.cmp(&b.company_code))
        });
        Ok(found)
    }

    async fn update(&self, presentation: &Presentation) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&presentation.presentation_id) {
            Some(existing) => {
                *existing = presentation.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(presentation.presentation_id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}
