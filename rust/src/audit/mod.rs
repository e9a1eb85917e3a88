//! Activity log
//!
//! Append-only audit trail. Every lifecycle transition, submission attempt and
//! login writes exactly one entry through [`ActivityLog`]. Recording is
//! best-effort: a failing audit backend is logged, never propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Module tags used on audit entries
pub mod modules {
    pub const AUTH: &str = "auth";
    pub const SSN: &str = "ssn";
    pub const PRESENTATIONS: &str = "presentations";
}

/// Severity / category of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Info,
    Warning,
    Error,
}

impl ActivityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::Info => "info",
            ActivityCategory::Warning => "warning",
            ActivityCategory::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => ActivityCategory::Warning,
            "error" => ActivityCategory::Error,
            _ => ActivityCategory::Info,
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub entry_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub category: ActivityCategory,
    #[serde(default)]
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(module: &str, action: impl Into<String>, category: ActivityCategory) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id: None,
            action: action.into(),
            module: module.to_string(),
            category,
            metadata: JsonValue::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn info(module: &str, action: impl Into<String>) -> Self {
        Self::new(module, action, ActivityCategory::Info)
    }

    pub fn error(module: &str, action: impl Into<String>) -> Self {
        Self::new(module, action, ActivityCategory::Error)
    }

    pub fn by(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Audit sink
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError>;

    /// Most recent entries first
    async fn recent(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError>;
}

/// Record an entry, logging instead of failing when the sink is unavailable
pub async fn record(log: &dyn ActivityLog, entry: ActivityLogEntry) {
    let action = entry.action.clone();
    if let Err(e) = log.append(entry).await {
        tracing::warn!("Failed to write activity log entry '{}': {}", action, e);
    }
}

/// In-memory activity log
#[derive(Default, Clone)]
pub struct MemoryActivityLog {
    entries: Arc<RwLock<Vec<ActivityLogEntry>>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in insertion order
    pub async fn entries(&self) -> Vec<ActivityLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn actions(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
