//! Presentation lifecycle
//!
//! Intake, processing, rectification resolution and deletion of filings.
//! Every state-changing operation, successful or not, writes exactly one
//! activity log entry describing the old status, the attempted action and
//! either the resulting status or the error.
//!
//! Submission and rectification requests talk to the regulator and live in
//! [`crate::submission`], which reuses the loading and audit helpers here.
//!
//! Changes to one presentation are serialized in-process: whoever holds the
//! claim on an id (a regulator call, a reprocess, a delete) makes every other
//! change to that id fail with `NotReady` until it is released.

use chrono::{FixedOffset, Offset, Utc};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::period::{self, EligiblePeriod};
use super::stock::{validate_items, StockItem};
use super::store::{MemoryPresentationStore, PresentationStore};
use super::types::{
    Cronograma, DeliveryKind, Presentation, PresentationFilter, PresentationKey,
    PresentationStatus,
};
use crate::audit::{self, modules, ActivityCategory, ActivityLog, ActivityLogEntry};
use crate::clock::SharedClock;
use crate::error::{FilingError, StoreError};

/// Audit action names
pub mod actions {
    pub const CREATE: &str = "presentation_create";
    pub const PROCESS: &str = "presentation_process";
    pub const SUBMIT: &str = "presentation_submit";
    pub const REQUEST_RECTIFICATION: &str = "rectification_request";
    pub const RESOLVE_RECTIFICATION: &str = "rectification_resolve";
    pub const DELETE: &str = "presentation_delete";
}

const MAX_COMPANY_CODE_LEN: usize = 10;

/// Context of one audited operation, filled in as the operation progresses
#[derive(Debug)]
pub(crate) struct Trail {
    module: &'static str,
    action: &'static str,
    actor: Option<Uuid>,
    presentation_id: Option<Uuid>,
    from: Option<PresentationStatus>,
    extra: Map<String, JsonValue>,
}

impl Trail {
    pub(crate) fn new(module: &'static str, action: &'static str, actor: Option<Uuid>) -> Self {
        Self {
            module,
            action,
            actor,
            presentation_id: None,
            from: None,
            extra: Map::new(),
        }
    }

    pub(crate) fn presentation(mut self, id: Uuid) -> Self {
        self.presentation_id = Some(id);
        self
    }

    /// Record the loaded record's identity and current status
    pub(crate) fn loaded(&mut self, presentation: &Presentation) {
        self.presentation_id = Some(presentation.presentation_id);
        self.from = Some(presentation.status);
    }

    pub(crate) fn note(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.extra.insert(key.to_string(), value.into());
    }
}

fn severity(error: &FilingError) -> ActivityCategory {
    match error {
        FilingError::AuthorityUnavailable
        | FilingError::AuthorityRejected { .. }
        | FilingError::AuthorityFailed { .. }
        | FilingError::Storage(_) => ActivityCategory::Error,
        _ => ActivityCategory::Warning,
    }
}

pub fn validate_company_code(code: &str) -> Result<String, FilingError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(FilingError::Validation(
            "company code is required".to_string(),
        ));
    }
    if code.len() > MAX_COMPANY_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FilingError::Validation(format!(
            "invalid company code '{}'",
            code
        )));
    }
    Ok(code.to_string())
}

/// The error to report when `existing` already occupies a key
fn conflict(existing: &Presentation) -> FilingError {
    if existing.status.is_blocking() {
        FilingError::BlockingDuplicate {
            status: existing.status,
        }
    } else {
        FilingError::Duplicate {
            status: existing.status,
        }
    }
}

/// Ids with a change in progress
#[derive(Default, Clone)]
struct InFlight {
    ids: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
    fn claim(&self, id: Uuid) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if ids.insert(id) {
            Some(InFlightGuard {
                ids: self.ids.clone(),
                id,
            })
        } else {
            None
        }
    }
}

/// Releases the claim when dropped, whatever the outcome
pub(crate) struct InFlightGuard {
    ids: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.remove(&self.id);
    }
}

pub struct PresentationLifecycle {
    store: Arc<dyn PresentationStore>,
    audit: Arc<dyn ActivityLog>,
    clock: SharedClock,
    /// Offset used to decide what "today" is for the eligibility window
    offset: FixedOffset,
    in_flight: InFlight,
}

impl PresentationLifecycle {
    pub fn new(
        store: Arc<dyn PresentationStore>,
        audit: Arc<dyn ActivityLog>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            offset: Utc.fix(),
            in_flight: InFlight::default(),
        }
    }

    /// Lifecycle over in-memory storage
    pub fn in_memory(audit: Arc<dyn ActivityLog>, clock: SharedClock) -> Self {
        Self::new(Arc::new(MemoryPresentationStore::new()), audit, clock)
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn store(&self) -> &Arc<dyn PresentationStore> {
        &self.store
    }

    pub fn audit_log(&self) -> &Arc<dyn ActivityLog> {
        &self.audit
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn show(&self, id: Uuid) -> Result<Presentation, FilingError> {
        self.store
            .get(id)
            .await?
            .ok_or(FilingError::NotFound(id))
    }

    pub async fn list(&self, filter: &PresentationFilter) -> Result<Vec<Presentation>, FilingError> {
        Ok(self.store.list(filter).await?)
    }

    /// Periods the company may open a filing for right now
    pub async fn eligible_periods(
        &self,
        company_code: &str,
        kind: DeliveryKind,
    ) -> Result<Vec<EligiblePeriod>, FilingError> {
        let company_code = validate_company_code(company_code)?;
        let existing: Vec<(String, PresentationStatus)> = self
            .store
            .list(&PresentationFilter {
                company_code: Some(company_code),
                kind: Some(kind),
                status: None,
            })
            .await?
            .into_iter()
            .map(|p| (p.cronograma, p.status))
            .collect();

        let today = self.clock.now().with_timezone(&self.offset).date_naive();
        Ok(period::eligible_periods(kind, today, &existing))
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Open a new, empty filing for (company, period, kind)
    pub async fn create(
        &self,
        company_code: &str,
        cronograma: &str,
        kind: DeliveryKind,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let mut trail = Trail::new(modules::PRESENTATIONS, actions::CREATE, actor);
        trail.note("company_code", company_code);
        trail.note("cronograma", cronograma);
        trail.note("kind", kind.as_str());

        let result = self.create_inner(company_code, cronograma, kind, actor).await;
        if let Ok(p) = &result {
            trail.presentation_id = Some(p.presentation_id);
        }
        self.settle(trail, result).await
    }

    async fn create_inner(
        &self,
        company_code: &str,
        cronograma: &str,
        kind: DeliveryKind,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let company_code = validate_company_code(company_code)?;
        let period = Cronograma::parse(cronograma, kind)?;
        let key = PresentationKey {
            company_code: company_code.clone(),
            cronograma: period.to_string(),
            kind,
        };

        if let Some(existing) = self.store.find_by_key(&key).await? {
            return Err(conflict(&existing));
        }

        let presentation = Presentation::new(company_code, period, kind, actor, self.clock.now());
        match self.store.insert(&presentation).await {
            Ok(()) => Ok(presentation),
            Err(StoreError::UniqueViolation(detail)) => {
                // lost a race; report whatever won it
                tracing::debug!("Unique violation on create: {}", detail);
                match self.store.find_by_key(&key).await? {
                    Some(existing) => Err(conflict(&existing)),
                    None => Err(FilingError::Storage(detail)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stage line items and move to `Draft`
    pub async fn process(
        &self,
        id: Uuid,
        items: Vec<StockItem>,
        original_file: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let mut trail = Trail::new(modules::PRESENTATIONS, actions::PROCESS, actor).presentation(id);
        trail.note("items", items.len());

        let result = self.process_inner(id, items, original_file, &mut trail).await;
        self.settle(trail, result).await
    }

    async fn process_inner(
        &self,
        id: Uuid,
        items: Vec<StockItem>,
        original_file: Option<String>,
        trail: &mut Trail,
    ) -> Result<Presentation, FilingError> {
        let presentation = self.load(id).await?;
        trail.loaded(&presentation);
        let _guard = self.claim(&presentation, "process")?;
        let mut presentation = self.load(id).await?;
        trail.loaded(&presentation);

        if !presentation.status.can_process() {
            return Err(FilingError::NotReady {
                action: "process",
                status: presentation.status,
            });
        }
        validate_items(&items)?;

        presentation.transition_to(PresentationStatus::Draft, "process", self.clock.now())?;
        presentation.notes = Some(format!("Loaded {} line items", items.len()));
        presentation.items = items;
        if original_file.is_some() {
            presentation.original_file = original_file;
        }

        self.store.update(&presentation).await?;
        Ok(presentation)
    }

    /// Record the regulator's verdict on a pending rectification
    pub async fn resolve_rectification(
        &self,
        id: Uuid,
        accepted: bool,
        notes: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let mut trail = Trail::new(
            modules::PRESENTATIONS,
            actions::RESOLVE_RECTIFICATION,
            actor,
        )
        .presentation(id);
        trail.note("accepted", accepted);

        let result = self
            .resolve_rectification_inner(id, accepted, notes, &mut trail)
            .await;
        self.settle(trail, result).await
    }

    async fn resolve_rectification_inner(
        &self,
        id: Uuid,
        accepted: bool,
        notes: Option<String>,
        trail: &mut Trail,
    ) -> Result<Presentation, FilingError> {
        let presentation = self.load(id).await?;
        trail.loaded(&presentation);
        let _guard = self.claim(&presentation, "resolve rectification for")?;
        let mut presentation = self.load(id).await?;
        trail.loaded(&presentation);

        let to = if accepted {
            PresentationStatus::RectificationAccepted
        } else {
            PresentationStatus::RectificationRejected
        };
        presentation.transition_to(to, "resolve rectification for", self.clock.now())?;
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            presentation.notes = Some(notes);
        }

        self.store.update(&presentation).await?;
        Ok(presentation)
    }

    /// Remove a filing that has not been submitted
    pub async fn delete(&self, id: Uuid, actor: Option<Uuid>) -> Result<Presentation, FilingError> {
        let mut trail = Trail::new(modules::PRESENTATIONS, actions::DELETE, actor).presentation(id);
        let result = self.delete_inner(id, &mut trail).await;
        self.settle(trail, result).await
    }

    async fn delete_inner(&self, id: Uuid, trail: &mut Trail) -> Result<Presentation, FilingError> {
        let presentation = self.load(id).await?;
        trail.loaded(&presentation);
        let _guard = self.claim(&presentation, "delete")?;
        let presentation = self.load(id).await?;
        trail.loaded(&presentation);

        if !presentation.status.can_delete() {
            return Err(FilingError::NotReady {
                action: "delete",
                status: presentation.status,
            });
        }
        if !self.store.delete(id).await? {
            return Err(FilingError::NotFound(id));
        }
        Ok(presentation)
    }

    // ------------------------------------------------------------------
    // Shared with the submission coordinator
    // ------------------------------------------------------------------

    /// Claim `presentation` for a change; `NotReady` while someone else holds it
    pub(crate) fn claim(
        &self,
        presentation: &Presentation,
        action: &'static str,
    ) -> Result<InFlightGuard, FilingError> {
        self.in_flight
            .claim(presentation.presentation_id)
            .ok_or_else(|| {
                tracing::warn!(
                    "Refusing to {} {}: another change is in progress",
                    action,
                    presentation.presentation_id
                );
                FilingError::NotReady {
                    action,
                    status: presentation.status,
                }
            })
    }

    pub(crate) async fn load(&self, id: Uuid) -> Result<Presentation, FilingError> {
        self.show(id).await
    }

    pub(crate) async fn save(&self, presentation: &Presentation) -> Result<(), FilingError> {
        Ok(self.store.update(presentation).await?)
    }

    /// Write the audit entry for a finished operation and hand the result back
    pub(crate) async fn settle(
        &self,
        trail: Trail,
        result: Result<Presentation, FilingError>,
    ) -> Result<Presentation, FilingError> {
        let mut metadata = trail.extra;
        metadata.insert("attempted".to_string(), json!(trail.action));
        metadata.insert("presentation_id".to_string(), json!(trail.presentation_id));
        metadata.insert(
            "from".to_string(),
            json!(trail.from.map(|s| s.as_str())),
        );

        let entry = match &result {
            Ok(p) => {
                metadata.insert("to".to_string(), json!(p.status.as_str()));
                tracing::info!(
                    "{} {} ({}/{}/{}): {:?} -> {}",
                    trail.action,
                    p.presentation_id,
                    p.company_code,
                    p.cronograma,
                    p.kind,
                    trail.from,
                    p.status
                );
                ActivityLogEntry::info(trail.module, trail.action)
            }
            Err(e) => {
                metadata.insert("error".to_string(), json!(e.to_string()));
                metadata.insert("error_code".to_string(), json!(e.code()));
                let category = severity(e);
                if category == ActivityCategory::Error {
                    tracing::error!("{} failed for {:?}: {}", trail.action, trail.presentation_id, e);
                } else {
                    tracing::warn!("{} rejected for {:?}: {}", trail.action, trail.presentation_id, e);
                }
                ActivityLogEntry::new(trail.module, format!("{}_failed", trail.action), category)
            }
        };

        audit::record(
            self.audit.as_ref(),
            entry
                .by(trail.actor)
                .at(self.clock.now())
                .with_metadata(JsonValue::Object(metadata)),
        )
        .await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryActivityLog;
    use crate::clock::FixedClock;
    use crate::presentation::stock::tests::sample_items;
    use chrono::TimeZone;

    struct Fixture {
        lifecycle: PresentationLifecycle,
        audit: MemoryActivityLog,
    }

    fn fixture() -> Fixture {
        let audit = MemoryActivityLog::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());
        let lifecycle = PresentationLifecycle::in_memory(Arc::new(audit.clone()), Arc::new(clock))
            .with_utc_offset(FixedOffset::west_opt(3 * 3600).unwrap());
        Fixture { lifecycle, audit }
    }

    async fn force_status(lifecycle: &PresentationLifecycle, id: Uuid, status: PresentationStatus) {
        let mut p = lifecycle.show(id).await.unwrap();
        p.status = status;
        lifecycle.save(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_starts_empty_and_audits() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();
        assert_eq!(p.status, PresentationStatus::Empty);
        assert_eq!(p.cronograma, "2025-01");

        let entries = f.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, actions::CREATE);
        assert_eq!(entries[0].metadata["to"], "VACIO");
        assert_eq!(entries[0].metadata["from"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_duplicate_and_blocking_duplicate() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();

        let err = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilingError::Duplicate { status: PresentationStatus::Empty }
        ));

        for status in [
            PresentationStatus::Submitted,
            PresentationStatus::RectificationPending,
        ] {
            force_status(&f.lifecycle, p.presentation_id, status).await;
            let err = f
                .lifecycle
                .create("0001", "2025-01", DeliveryKind::Monthly, None)
                .await
                .unwrap_err();
            assert!(matches!(err, FilingError::BlockingDuplicate { status: s } if s == status));
            assert!(err.to_string().contains(status.as_str()));
        }

        // the weekly filing for the same company is a different key
        f.lifecycle
            .create("0001", "2025-03", DeliveryKind::Weekly, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture();
        for (company, period) in [("", "2025-01"), ("00 1", "2025-01"), ("0001", "2025-13")] {
            let err = f
                .lifecycle
                .create(company, period, DeliveryKind::Monthly, None)
                .await
                .unwrap_err();
            assert!(matches!(err, FilingError::Validation(_)), "{company}/{period}");
        }
        let actions = f.audit.actions().await;
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| a == "presentation_create_failed"));
    }

    #[tokio::test]
    async fn test_process_moves_to_draft_and_replaces_items() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();

        let processed = f
            .lifecycle
            .process(
                p.presentation_id,
                sample_items(),
                Some("stock-2025-01.xlsx".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(processed.status, PresentationStatus::Draft);
        assert_eq!(processed.items.len(), 3);
        assert_eq!(processed.notes.as_deref(), Some("Loaded 3 line items"));

        // re-processing replaces, keeps the original file reference
        let reprocessed = f
            .lifecycle
            .process(p.presentation_id, sample_items()[..1].to_vec(), None, None)
            .await
            .unwrap();
        assert_eq!(reprocessed.items.len(), 1);
        assert_eq!(reprocessed.original_file.as_deref(), Some("stock-2025-01.xlsx"));
    }

    #[tokio::test]
    async fn test_process_invalid_items_leaves_state() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();
        let mut items = sample_items();
        if let StockItem::Investment(ref mut i) = items[0] {
            i.quantity = rust_decimal::Decimal::ZERO;
        }

        let err = f
            .lifecycle
            .process(p.presentation_id, items, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingError::Validation(_)));
        assert_eq!(
            f.lifecycle.show(p.presentation_id).await.unwrap().status,
            PresentationStatus::Empty
        );

        let last = f.audit.entries().await.pop().unwrap();
        assert_eq!(last.action, "presentation_process_failed");
        assert_eq!(last.metadata["from"], "VACIO");
        assert_eq!(last.metadata["error_code"], "validation");
    }

    #[tokio::test]
    async fn test_process_missing_is_not_found() {
        let f = fixture();
        let id = Uuid::new_v4();
        assert!(matches!(
            f.lifecycle.process(id, vec![], None, None).await,
            Err(FilingError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_resolve_rectification() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();

        let err = f
            .lifecycle
            .resolve_rectification(p.presentation_id, true, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingError::NotReady { .. }));

        force_status(&f.lifecycle, p.presentation_id, PresentationStatus::RectificationPending)
            .await;
        let resolved = f
            .lifecycle
            .resolve_rectification(
                p.presentation_id,
                false,
                Some("Missing custodian detail".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, PresentationStatus::RectificationRejected);
        assert_eq!(resolved.notes.as_deref(), Some("Missing custodian detail"));
    }

    #[tokio::test]
    async fn test_delete_only_before_submission() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();
        force_status(&f.lifecycle, p.presentation_id, PresentationStatus::Submitted).await;
        assert!(matches!(
            f.lifecycle.delete(p.presentation_id, None).await,
            Err(FilingError::NotReady { action: "delete", .. })
        ));

        force_status(&f.lifecycle, p.presentation_id, PresentationStatus::Draft).await;
        f.lifecycle.delete(p.presentation_id, None).await.unwrap();
        assert!(f.lifecycle.list(&PresentationFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eligible_periods_reflect_existing() {
        let f = fixture();
        let p = f
            .lifecycle
            .create("0001", "2025-02", DeliveryKind::Monthly, None)
            .await
            .unwrap();

        let periods = f
            .lifecycle
            .eligible_periods("0001", DeliveryKind::Monthly)
            .await
            .unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].cronograma, "2025-02");
        assert_eq!(periods[0].existing_status, Some(PresentationStatus::Empty));
        assert_eq!(periods[1].cronograma, "2025-01");

        force_status(&f.lifecycle, p.presentation_id, PresentationStatus::Submitted).await;
        let periods = f
            .lifecycle
            .eligible_periods("0001", DeliveryKind::Monthly)
            .await
            .unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].cronograma, "2025-01");

        // other companies are unaffected
        let periods = f
            .lifecycle
            .eligible_periods("0002", DeliveryKind::Monthly)
            .await
            .unwrap();
        assert_eq!(periods.len(), 2);
    }
}
