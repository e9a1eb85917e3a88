//! End-to-end filing flows over the in-memory stack

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use ssn_filings::audit::ActivityCategory;
use ssn_filings::authority::{
    AuthorityClient, AuthorityLogin, FilingPayload, MockAuthorityClient,
    RectificationRequest, RegulatorReceipt,
};
use ssn_filings::config::AuthorityCredentials;
use ssn_filings::clock::{FixedClock, SharedClock};
use ssn_filings::error::AuthorityCallError;
use ssn_filings::presentation::{DeliveryKind, PresentationStatus, StockItem};
use ssn_filings::session::{hash_password, FlashLevel, StaticCredentialVerifier};
use ssn_filings::{AppConfig, Backends, FilingError, Services};

/// Regulator that is down for every call
struct UnreachableRegulator;

#[async_trait]
impl AuthorityClient for UnreachableRegulator {
    fn is_mock(&self) -> bool {
        false
    }

    async fn authenticate(&self, _: &AuthorityCredentials) -> Option<AuthorityLogin> {
        None
    }

    async fn submit_filing(
        &self,
        _: &str,
        _: &FilingPayload,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        Err(AuthorityCallError::Transport("connection refused".to_string()))
    }

    async fn request_rectification(
        &self,
        _: &str,
        _: &RectificationRequest,
    ) -> Result<RegulatorReceipt, AuthorityCallError> {
        Err(AuthorityCallError::Transport("connection refused".to_string()))
    }
}

fn config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "SSN_MOCK_ENABLED" => Some("true".to_string()),
        _ => None,
    })
    .unwrap()
}

fn services(client: Arc<dyn AuthorityClient>) -> Services {
    let clock: SharedClock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 2, 12, 13, 0, 0).unwrap(),
    ));
    let verifier = Arc::new(StaticCredentialVerifier::new(&[ssn_filings::config::UserEntry {
        username: "operador".to_string(),
        password_sha256: hash_password("s3creto"),
    }]));
    Services::assemble(&config(), Backends::in_memory(), clock, client, verifier)
}

fn items() -> Vec<StockItem> {
    serde_json::from_value(json!([
        {
            "instrument": "investment",
            "species_type": "TP",
            "species_code": "AL30",
            "quantity": "1500",
            "accounting_value": "120000.50",
            "market_value": "118900.00",
            "in_custody": true,
            "custodian_code": "CV01"
        },
        {
            "instrument": "time_deposit",
            "bank_code": "0011",
            "deposit_type": "PF",
            "issue_date": "2025-01-02",
            "maturity_date": "2025-03-02",
            "nominal_value": "500000",
            "accounting_value": "512300.25",
            "in_custody": false
        }
    ]))
    .unwrap()
}

#[tokio::test]
async fn test_monthly_filing_reaches_regulator_once() {
    let services = services(Arc::new(MockAuthorityClient::new(
        "mock-ssn-token",
        "31/12/2099 23:59:59",
    )));
    services.gate.login("operador", "s3creto").await.unwrap();

    let created = services
        .lifecycle
        .create("0001", "2025-01", DeliveryKind::Monthly, None)
        .await
        .unwrap();
    assert_eq!(created.status, PresentationStatus::Empty);

    let draft = services
        .lifecycle
        .process(created.presentation_id, items(), Some("stock_enero.xlsx".to_string()), None)
        .await
        .unwrap();
    assert_eq!(draft.status, PresentationStatus::Draft);

    let submitted = services
        .coordinator
        .submit(created.presentation_id, DeliveryKind::Monthly, None)
        .await
        .unwrap();
    assert_eq!(submitted.status, PresentationStatus::Submitted);
    assert!(submitted.response_id.is_some());
    assert!(submitted.presented_at.is_some());

    match services
        .lifecycle
        .create("0001", "2025-01", DeliveryKind::Monthly, None)
        .await
    {
        Err(e @ FilingError::BlockingDuplicate { .. }) => {
            assert!(e.to_string().contains("PRESENTADO"));
        }
        other => panic!("expected blocking duplicate, got {other:?}"),
    }

    // the submitted period is no longer offered
    let eligible = services
        .lifecycle
        .eligible_periods("0001", DeliveryKind::Monthly)
        .await
        .unwrap();
    assert!(eligible.iter().all(|p| p.cronograma != "2025-01"));
    assert!(eligible.iter().any(|p| p.cronograma == "2024-12"));

    let entries = services.activity.recent(100).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"presentation_create"));
    assert!(actions.contains(&"presentation_submit"));
    assert!(actions.contains(&"presentation_create_failed"));
}

#[tokio::test]
async fn test_rectification_round_trip() {
    let services = services(Arc::new(MockAuthorityClient::new(
        "mock-ssn-token",
        "31/12/2099 23:59:59",
    )));
    services.gate.login("operador", "s3creto").await.unwrap();

    let p = services
        .lifecycle
        .create("0001", "2025-01", DeliveryKind::Monthly, None)
        .await
        .unwrap();
    services
        .lifecycle
        .process(p.presentation_id, items(), None, None)
        .await
        .unwrap();
    services
        .coordinator
        .submit(p.presentation_id, DeliveryKind::Monthly, None)
        .await
        .unwrap();

    let pending = services
        .coordinator
        .request_rectification(p.presentation_id, Some("valuacion".to_string()), None)
        .await
        .unwrap();
    assert_eq!(pending.status, PresentationStatus::RectificationPending);

    // a rejected request can be raised again
    let rejected = services
        .lifecycle
        .resolve_rectification(p.presentation_id, false, Some("fuera de plazo".to_string()), None)
        .await
        .unwrap();
    assert_eq!(rejected.status, PresentationStatus::RectificationRejected);

    services
        .coordinator
        .request_rectification(p.presentation_id, None, None)
        .await
        .unwrap();
    let accepted = services
        .lifecycle
        .resolve_rectification(p.presentation_id, true, None, None)
        .await
        .unwrap();
    assert_eq!(accepted.status, PresentationStatus::RectificationAccepted);
    assert!(accepted.response_id.is_some());

    let err = services
        .lifecycle
        .process(p.presentation_id, items(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FilingError::NotReady { .. }));
}

#[tokio::test]
async fn test_login_survives_regulator_outage() {
    let services = services(Arc::new(UnreachableRegulator));

    let outcome = services.gate.login("operador", "s3creto").await.unwrap();
    assert!(!outcome.authority.is_connected());
    assert_eq!(outcome.flash.level, FlashLevel::Warning);
    assert!(outcome.session.authority.is_none());
    assert!(services.gate.session(outcome.session.session_id).await.is_some());

    let entries = services.activity.recent(100).await.unwrap();
    let failed = entries
        .iter()
        .find(|e| e.action == "connection_failed")
        .unwrap();
    assert_eq!(failed.category, ActivityCategory::Error);
    assert!(entries.iter().any(|e| e.action == "login"));

    // filings that need the regulator fail cleanly without a session token
    let p = services
        .lifecycle
        .create("0001", "2025-01", DeliveryKind::Monthly, None)
        .await
        .unwrap();
    services
        .lifecycle
        .process(p.presentation_id, items(), None, None)
        .await
        .unwrap();
    let err = services
        .coordinator
        .submit(p.presentation_id, DeliveryKind::Monthly, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FilingError::AuthorityUnavailable));
    assert_eq!(
        services.lifecycle.show(p.presentation_id).await.unwrap().status,
        PresentationStatus::Draft
    );
}
