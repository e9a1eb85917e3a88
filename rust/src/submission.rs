//! Submission of filings to the SSN
//!
//! [`SubmissionCoordinator`] moves a `Draft` presentation to `Submitted` (and a
//! submitted one to `RectificationPending`) by calling the regulator. Failed
//! calls leave the record untouched and are never retried automatically.
//!
//! The record is not locked while the regulator call is in flight. Instead
//! the lifecycle's per-process guard keyed by presentation id turns any other
//! concurrent change to the same filing into a `NotReady` error, and the
//! record is re-read once the guard is held.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::modules;
use crate::authority::{AuthorityService, AuthorityToken, FilingPayload, RectificationRequest};
use crate::error::{AuthorityError, FilingError};
use crate::presentation::lifecycle::{actions, Trail};
use crate::presentation::{DeliveryKind, Presentation, PresentationLifecycle, PresentationStatus};

/// Build the regulator payload for a filing
pub fn build_payload(presentation: &Presentation) -> FilingPayload {
    FilingPayload {
        codigo_compania: presentation.company_code.clone(),
        cronograma: presentation.cronograma.clone(),
        tipo_entrega: presentation.kind.wire_label(),
        stocks: presentation.items.iter().map(|item| item.to_wire()).collect(),
        kind: presentation.kind,
    }
}

pub struct SubmissionCoordinator {
    lifecycle: Arc<PresentationLifecycle>,
    authority: Arc<AuthorityService>,
}

impl SubmissionCoordinator {
    pub fn new(lifecycle: Arc<PresentationLifecycle>, authority: Arc<AuthorityService>) -> Self {
        Self {
            lifecycle,
            authority,
        }
    }

    /// Send a `Draft` filing to the regulator.
    ///
    /// `kind` is the cadence of the calling endpoint; a filing of the other
    /// cadence is refused.
    pub async fn submit(
        &self,
        id: Uuid,
        kind: DeliveryKind,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let mut trail = Trail::new(modules::SSN, actions::SUBMIT, actor).presentation(id);
        trail.note("kind", kind.as_str());

        let result = self.submit_inner(id, kind, &mut trail).await;
        self.lifecycle.settle(trail, result).await
    }

    async fn submit_inner(
        &self,
        id: Uuid,
        kind: DeliveryKind,
        trail: &mut Trail,
    ) -> Result<Presentation, FilingError> {
        let presentation = self.lifecycle.load(id).await?;
        trail.loaded(&presentation);

        if presentation.kind != kind {
            return Err(FilingError::WrongKind {
                expected: kind,
                actual: presentation.kind,
            });
        }
        if !presentation.status.can_submit() {
            return Err(FilingError::NotReady {
                action: "submit",
                status: presentation.status,
            });
        }

        let _guard = self
            .lifecycle
            .claim(&presentation, "start another regulator call on")?;
        let mut presentation = self.lifecycle.load(id).await?;
        trail.loaded(&presentation);
        if !presentation.status.can_submit() {
            return Err(FilingError::NotReady {
                action: "submit",
                status: presentation.status,
            });
        }

        let token = self.token().await?;
        let payload = build_payload(&presentation);
        trail.note("items", payload.stocks.len());

        let receipt = self
            .authority
            .client()
            .submit_filing(&token.token, &payload)
            .await
            .map_err(|e| {
                trail.note("raw_error", e.to_string());
                FilingError::from(e)
            })?;

        let now = self.lifecycle.clock().now();
        presentation.transition_to(PresentationStatus::Submitted, "submit", now)?;
        presentation.response_id = Some(receipt.response_id.clone());
        presentation.response_payload = Some(receipt.payload);
        presentation.presented_at = Some(now);
        trail.note("response_id", receipt.response_id);
        trail.note("mock", token.is_mock);

        self.lifecycle.save(&presentation).await?;
        Ok(presentation)
    }

    /// Ask the regulator to reopen a submitted filing for amendment
    pub async fn request_rectification(
        &self,
        id: Uuid,
        reason: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<Presentation, FilingError> {
        let mut trail =
            Trail::new(modules::SSN, actions::REQUEST_RECTIFICATION, actor).presentation(id);
        trail.note("reason", reason.clone());

        let result = self.request_rectification_inner(id, reason, &mut trail).await;
        self.lifecycle.settle(trail, result).await
    }

    async fn request_rectification_inner(
        &self,
        id: Uuid,
        reason: Option<String>,
        trail: &mut Trail,
    ) -> Result<Presentation, FilingError> {
        let presentation = self.lifecycle.load(id).await?;
        trail.loaded(&presentation);
        if !presentation.status.can_request_rectification() {
            return Err(FilingError::NotReady {
                action: "request rectification for",
                status: presentation.status,
            });
        }

        let _guard = self
            .lifecycle
            .claim(&presentation, "start another regulator call on")?;
        let mut presentation = self.lifecycle.load(id).await?;
        trail.loaded(&presentation);
        if !presentation.status.can_request_rectification() {
            return Err(FilingError::NotReady {
                action: "request rectification for",
                status: presentation.status,
            });
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        let token = self.token().await?;
        let request = RectificationRequest {
            codigo_compania: presentation.company_code.clone(),
            cronograma: presentation.cronograma.clone(),
            tipo_entrega: presentation.kind.wire_label(),
            motivo: reason.clone(),
            kind: presentation.kind,
        };

        let receipt = self
            .authority
            .client()
            .request_rectification(&token.token, &request)
            .await
            .map_err(|e| {
                trail.note("raw_error", e.to_string());
                FilingError::from(e)
            })?;

        presentation.transition_to(
            PresentationStatus::RectificationPending,
            "request rectification for",
            self.lifecycle.clock().now(),
        )?;
        presentation.notes = Some(match reason {
            Some(reason) => format!("Rectification {} requested: {}", receipt.response_id, reason),
            None => format!("Rectification {} requested", receipt.response_id),
        });
        trail.note("response_id", receipt.response_id);

        self.lifecycle.save(&presentation).await?;
        Ok(presentation)
    }

    async fn token(&self) -> Result<AuthorityToken, FilingError> {
        self.authority.valid_token().await.map_err(|e| {
            match &e {
                AuthorityError::Unavailable => {
                    tracing::warn!("SSN session unavailable, submission aborted")
                }
                AuthorityError::TokenStore(inner) => {
                    tracing::error!("SSN token could not be stored: {}", inner)
                }
            }
            FilingError::AuthorityUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryActivityLog;
    use crate::authority::{
        AuthorityClient, AuthorityLogin, MockAuthorityClient, RegulatorReceipt, TokenCache,
    };
    use crate::clock::FixedClock;
    use crate::config::{AuthorityConfig, AuthorityCredentials};
    use crate::error::AuthorityCallError;
    use crate::presentation::stock::tests::sample_items;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Regulator double with scripted answers
    #[derive(Default)]
    struct ScriptedClient {
        logins: AtomicUsize,
        submissions: AtomicUsize,
        refuse_login: bool,
        reject: Option<AuthorityCallError>,
        /// When set, submissions wait for a notification
        hold: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl AuthorityClient for ScriptedClient {
        fn is_mock(&self) -> bool {
            false
        }

        async fn authenticate(&self, _c: &AuthorityCredentials) -> Option<AuthorityLogin> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.refuse_login {
                return None;
            }
            Some(AuthorityLogin {
                token: "live-token".to_string(),
                expiration: "31 dic 2099 23:59:59".to_string(),
                success: true,
                mock: false,
            })
        }

        async fn submit_filing(
            &self,
            token: &str,
            filing: &FilingPayload,
        ) -> Result<RegulatorReceipt, AuthorityCallError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            assert_eq!(token, "live-token");
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            match &self.reject {
                Some(e) => Err(e.clone()),
                None => Ok(RegulatorReceipt {
                    response_id: "SSN-4471".to_string(),
                    payload: json!({ "id": "SSN-4471", "items": filing.stocks.len() }),
                }),
            }
        }

        async fn request_rectification(
            &self,
            _token: &str,
            request: &RectificationRequest,
        ) -> Result<RegulatorReceipt, AuthorityCallError> {
            match &self.reject {
                Some(e) => Err(e.clone()),
                None => Ok(RegulatorReceipt {
                    response_id: "RECT-1".to_string(),
                    payload: json!({ "id": "RECT-1", "motivo": request.motivo }),
                }),
            }
        }
    }

    struct Fixture {
        coordinator: Arc<SubmissionCoordinator>,
        lifecycle: Arc<PresentationLifecycle>,
        audit: MemoryActivityLog,
    }

    fn fixture(client: Arc<dyn AuthorityClient>) -> Fixture {
        let clock: crate::clock::SharedClock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 2, 12, 13, 0, 0).unwrap(),
        ));
        let audit = MemoryActivityLog::new();
        let lifecycle = Arc::new(PresentationLifecycle::in_memory(
            Arc::new(audit.clone()),
            clock.clone(),
        ));
        let cache = Arc::new(TokenCache::in_memory(clock));
        let authority = Arc::new(AuthorityService::new(
            client,
            cache,
            &AuthorityConfig::mock(),
        ));
        Fixture {
            coordinator: Arc::new(SubmissionCoordinator::new(lifecycle.clone(), authority)),
            lifecycle,
            audit,
        }
    }

    async fn draft(f: &Fixture, kind: DeliveryKind) -> Presentation {
        let period = match kind {
            DeliveryKind::Monthly => "2025-01",
            DeliveryKind::Weekly => "2025-05",
        };
        let p = f.lifecycle.create("0001", period, kind, None).await.unwrap();
        f.lifecycle
            .process(p.presentation_id, sample_items(), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_from_empty_is_not_ready_without_contacting_regulator() {
        let client = Arc::new(ScriptedClient::default());
        let f = fixture(client.clone());
        let p = f
            .lifecycle
            .create("0001", "2025-01", DeliveryKind::Monthly, None)
            .await
            .unwrap();

        let err = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilingError::NotReady { status: PresentationStatus::Empty, .. }
        ));
        assert_eq!(client.logins.load(Ordering::SeqCst), 0);
        assert_eq!(client.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_success_records_receipt() {
        let client = Arc::new(ScriptedClient::default());
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;

        let submitted = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap();
        assert_eq!(submitted.status, PresentationStatus::Submitted);
        assert_eq!(submitted.response_id.as_deref(), Some("SSN-4471"));
        assert_eq!(submitted.response_payload.as_ref().unwrap()["items"], 3);
        assert_eq!(
            submitted.presented_at,
            Some(Utc.with_ymd_and_hms(2025, 2, 12, 13, 0, 0).unwrap())
        );

        let last = f.audit.entries().await.pop().unwrap();
        assert_eq!(last.action, actions::SUBMIT);
        assert_eq!(last.module, modules::SSN);
        assert_eq!(last.metadata["from"], "CARGADO");
        assert_eq!(last.metadata["to"], "PRESENTADO");
    }

    #[tokio::test]
    async fn test_wrong_kind_rejected() {
        let f = fixture(Arc::new(ScriptedClient::default()));
        let p = draft(&f, DeliveryKind::Weekly).await;
        let err = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilingError::WrongKind {
                expected: DeliveryKind::Monthly,
                actual: DeliveryKind::Weekly
            }
        ));
    }

    #[tokio::test]
    async fn test_no_session_leaves_presentation_unchanged() {
        let client = Arc::new(ScriptedClient {
            refuse_login: true,
            ..Default::default()
        });
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;

        let err = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FilingError::AuthorityUnavailable));
        assert_eq!(client.submissions.load(Ordering::SeqCst), 0);

        let stored = f.lifecycle.show(p.presentation_id).await.unwrap();
        assert_eq!(stored.status, PresentationStatus::Draft);
        assert!(stored.response_id.is_none());
    }

    #[tokio::test]
    async fn test_regulator_rejection_is_audited_and_not_retried() {
        let client = Arc::new(ScriptedClient {
            reject: Some(AuthorityCallError::Rejected {
                status: 400,
                body: "cronograma cerrado".to_string(),
            }),
            ..Default::default()
        });
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;

        let err = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilingError::AuthorityRejected { status: Some(400), .. }
        ));
        assert_eq!(client.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.lifecycle.show(p.presentation_id).await.unwrap().status,
            PresentationStatus::Draft
        );

        let last = f.audit.entries().await.pop().unwrap();
        assert_eq!(last.action, "presentation_submit_failed");
        assert!(last.metadata["raw_error"]
            .as_str()
            .unwrap()
            .contains("cronograma cerrado"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_without_internals() {
        let url = "https://10.9.8.7/api/inv/entregaMensual";
        let client = Arc::new(ScriptedClient {
            reject: Some(AuthorityCallError::Transport(format!(
                "error sending request for url ({}): operation timed out",
                url
            ))),
            ..Default::default()
        });
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;

        let err = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "authority_failed");
        assert!(!err.user_message().contains(url));
        assert!(!err.user_message().to_lowercase().contains("rejected"));

        let last = f.audit.entries().await.pop().unwrap();
        assert_eq!(last.category, crate::audit::ActivityCategory::Error);
        assert!(last.metadata["raw_error"].as_str().unwrap().contains(url));
        assert_eq!(
            f.lifecycle.show(p.presentation_id).await.unwrap().status,
            PresentationStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_concurrent_submit_is_refused_while_in_flight() {
        let hold = Arc::new(Notify::new());
        let client = Arc::new(ScriptedClient {
            hold: Some(hold.clone()),
            ..Default::default()
        });
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;
        let id = p.presentation_id;

        let coordinator = f.coordinator.clone();
        let first =
            tokio::spawn(async move { coordinator.submit(id, DeliveryKind::Monthly, None).await });
        while client.submissions.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = f.coordinator.submit(id, DeliveryKind::Monthly, None).await;
        assert!(matches!(second, Err(FilingError::NotReady { .. })));

        hold.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status, PresentationStatus::Submitted);
        assert_eq!(client.submissions.load(Ordering::SeqCst), 1);

        // once settled, a resubmission is refused by status
        let third = f.coordinator.submit(id, DeliveryKind::Monthly, None).await;
        assert!(matches!(
            third,
            Err(FilingError::NotReady { status: PresentationStatus::Submitted, .. })
        ));
    }

    #[tokio::test]
    async fn test_process_and_delete_wait_for_pending_submission() {
        let hold = Arc::new(Notify::new());
        let client = Arc::new(ScriptedClient {
            hold: Some(hold.clone()),
            ..Default::default()
        });
        let f = fixture(client.clone());
        let p = draft(&f, DeliveryKind::Monthly).await;
        let id = p.presentation_id;

        let coordinator = f.coordinator.clone();
        let first =
            tokio::spawn(async move { coordinator.submit(id, DeliveryKind::Monthly, None).await });
        while client.submissions.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let reprocess = f.lifecycle.process(id, Vec::new(), None, None).await;
        assert!(matches!(reprocess, Err(FilingError::NotReady { action: "process", .. })));
        let delete = f.lifecycle.delete(id, None).await;
        assert!(matches!(delete, Err(FilingError::NotReady { action: "delete", .. })));

        hold.notify_one();
        let submitted = first.await.unwrap().unwrap();
        assert_eq!(submitted.status, PresentationStatus::Submitted);

        let stored = f.lifecycle.show(id).await.unwrap();
        assert_eq!(stored.items, p.items);
        assert_eq!(stored.response_id.as_deref(), Some("SSN-4471"));
    }

    #[tokio::test]
    async fn test_rectification_round_trip_with_mock() {
        let f = fixture(Arc::new(MockAuthorityClient::new(
            "mock-ssn-token",
            "31 dic 2099 23:59:59",
        )));
        let p = draft(&f, DeliveryKind::Monthly).await;

        let early = f
            .coordinator
            .request_rectification(p.presentation_id, None, None)
            .await;
        assert!(matches!(early, Err(FilingError::NotReady { .. })));

        let submitted = f
            .coordinator
            .submit(p.presentation_id, DeliveryKind::Monthly, None)
            .await
            .unwrap();
        assert!(submitted.response_id.unwrap().starts_with("MOCK-"));

        let pending = f
            .coordinator
            .request_rectification(
                p.presentation_id,
                Some("Wrong custodian".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(pending.status, PresentationStatus::RectificationPending);
        assert!(pending.notes.unwrap().ends_with("Wrong custodian"));

        let rejected = f
            .lifecycle
            .resolve_rectification(p.presentation_id, false, None, None)
            .await
            .unwrap();
        assert_eq!(rejected.status, PresentationStatus::RectificationRejected);

        // a rejected rectification may be requested again
        let again = f
            .coordinator
            .request_rectification(p.presentation_id, None, None)
            .await
            .unwrap();
        assert_eq!(again.status, PresentationStatus::RectificationPending);
    }

    #[test]
    fn test_build_payload_uses_wire_labels() {
        let mut p = Presentation::new(
            "0001",
            crate::presentation::Cronograma::weekly(2025, 5),
            DeliveryKind::Weekly,
            None,
            Utc::now(),
        );
        p.items = sample_items();
        let payload = build_payload(&p);
        assert_eq!(payload.tipo_entrega, "Semanal");
        assert_eq!(payload.stocks.len(), 3);
        assert_eq!(payload.stocks[0]["tipo"], "I");
    }
}
