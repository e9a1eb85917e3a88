//! Presentation records and their status vocabulary

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::stock::StockItem;
use crate::error::FilingError;

/// Filing cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Weekly,
    #[default]
    Monthly,
}

impl DeliveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::Weekly => "weekly",
            DeliveryKind::Monthly => "monthly",
        }
    }

    /// Label the SSN uses in payloads
    pub fn wire_label(&self) -> &'static str {
        match self {
            DeliveryKind::Weekly => "Semanal",
            DeliveryKind::Monthly => "Mensual",
        }
    }
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryKind {
    type Err = FilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "semanal" => Ok(DeliveryKind::Weekly),
            "monthly" | "mensual" => Ok(DeliveryKind::Monthly),
            other => Err(FilingError::Validation(format!(
                "unknown delivery kind '{}'",
                other
            ))),
        }
    }
}

/// Status of a presentation.
///
/// Persisted with the literals used by the SSN back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresentationStatus {
    #[serde(rename = "VACIO")]
    Empty,
    #[serde(rename = "CARGADO")]
    Draft,
    #[serde(rename = "PRESENTADO")]
    Submitted,
    #[serde(rename = "RECTIFICACION_PENDIENTE")]
    RectificationPending,
    #[serde(rename = "RECTIFICACION_ACEPTADA")]
    RectificationAccepted,
    #[serde(rename = "RECTIFICACION_RECHAZADA")]
    RectificationRejected,
}

impl PresentationStatus {
    pub const ALL: [PresentationStatus; 6] = [
        PresentationStatus::Empty,
        PresentationStatus::Draft,
        PresentationStatus::Submitted,
        PresentationStatus::RectificationPending,
        PresentationStatus::RectificationAccepted,
        PresentationStatus::RectificationRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresentationStatus::Empty => "VACIO",
            PresentationStatus::Draft => "CARGADO",
            PresentationStatus::Submitted => "PRESENTADO",
            PresentationStatus::RectificationPending => "RECTIFICACION_PENDIENTE",
            PresentationStatus::RectificationAccepted => "RECTIFICACION_ACEPTADA",
            PresentationStatus::RectificationRejected => "RECTIFICACION_RECHAZADA",
        }
    }

    /// Statuses that forbid another filing for the same company/period/kind
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            PresentationStatus::Submitted | PresentationStatus::RectificationPending
        )
    }

    pub fn can_process(&self) -> bool {
        matches!(self, PresentationStatus::Empty | PresentationStatus::Draft)
    }

    pub fn can_submit(&self) -> bool {
        matches!(self, PresentationStatus::Draft)
    }

    pub fn can_request_rectification(&self) -> bool {
        matches!(
            self,
            PresentationStatus::Submitted | PresentationStatus::RectificationRejected
        )
    }

    pub fn can_resolve_rectification(&self) -> bool {
        matches!(self, PresentationStatus::RectificationPending)
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, PresentationStatus::Empty | PresentationStatus::Draft)
    }
}

impl fmt::Display for PresentationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresentationStatus {
    type Err = FilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresentationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FilingError::Validation(format!("unknown status '{}'", s)))
    }
}

/// Filing period ("cronograma").
///
/// Monthly periods are `YYYY-MM`; weekly periods are ISO weeks, `YYYY-WW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cronograma {
    pub year: i32,
    /// Month (1..=12) or ISO week (1..=53) depending on the delivery kind
    pub index: u32,
}

impl Cronograma {
    pub fn monthly(year: i32, month: u32) -> Self {
        Self { year, index: month }
    }

    pub fn weekly(year: i32, week: u32) -> Self {
        Self { year, index: week }
    }

    /// Parse and validate a period for the given cadence
    pub fn parse(raw: &str, kind: DeliveryKind) -> Result<Self, FilingError> {
        let invalid = || {
            FilingError::Validation(format!(
                "invalid {} period '{}', expected YYYY-{}",
                kind,
                raw,
                match kind {
                    DeliveryKind::Monthly => "MM",
                    DeliveryKind::Weekly => "WW",
                }
            ))
        };

        let (year, index) = raw.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || index.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let index: u32 = index.parse().map_err(|_| invalid())?;

        let valid = match kind {
            DeliveryKind::Monthly => (1..=12).contains(&index),
            DeliveryKind::Weekly => {
                (1..=53).contains(&index)
                    && NaiveDate::from_isoywd_opt(year, index, chrono::Weekday::Mon).is_some()
            }
        };
        if !valid || year < 1900 {
            return Err(invalid());
        }

        Ok(Self { year, index })
    }

    /// Month containing `date`
    pub fn month_of(date: NaiveDate) -> Self {
        Self::monthly(date.year(), date.month())
    }

    /// ISO week containing `date`
    pub fn week_of(date: NaiveDate) -> Self {
        let week = date.iso_week();
        Self::weekly(week.year(), week.week())
    }
}

impl fmt::Display for Cronograma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.index)
    }
}

/// One regulatory filing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub presentation_id: Uuid,
    pub company_code: String,
    pub cronograma: String,
    pub kind: DeliveryKind,
    pub status: PresentationStatus,
    pub original_file: Option<String>,
    pub response_id: Option<String>,
    pub response_payload: Option<JsonValue>,
    pub presented_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<StockItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Presentation {
    /// A fresh, empty filing
    pub fn new(
        company_code: impl Into<String>,
        cronograma: Cronograma,
        kind: DeliveryKind,
        owner_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            presentation_id: Uuid::new_v4(),
            company_code: company_code.into(),
            cronograma: cronograma.to_string(),
            kind,
            status: PresentationStatus::Empty,
            original_file: None,
            response_id: None,
            response_payload: None,
            presented_at: None,
            notes: None,
            owner_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PresentationKey {
        PresentationKey {
            company_code: self.company_code.clone(),
            cronograma: self.cronograma.clone(),
            kind: self.kind,
        }
    }

    /// Move to `to`, enforcing the transition table
    pub fn transition_to(
        &mut self,
        to: PresentationStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<PresentationStatus, FilingError> {
        use PresentationStatus::*;

        let allowed = matches!(
            (self.status, to),
            (Empty, Draft)
                | (Draft, Draft)
                | (Draft, Submitted)
                | (Submitted, RectificationPending)
                | (RectificationRejected, RectificationPending)
                | (RectificationPending, RectificationAccepted)
                | (RectificationPending, RectificationRejected)
        );
        if !allowed {
            return Err(FilingError::NotReady {
                action,
                status: self.status,
            });
        }

        let from = std::mem::replace(&mut self.status, to);
        self.updated_at = now;
        Ok(from)
    }
}

/// Uniqueness key of a presentation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresentationKey {
    pub company_code: String,
    pub cronograma: String,
    pub kind: DeliveryKind,
}

/// Filters for listing presentations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresentationFilter {
    pub company_code: Option<String>,
    pub kind: Option<DeliveryKind>,
    pub status: Option<PresentationStatus>,
}

impl PresentationFilter {
    pub fn matches(&self, p: &Presentation) -> bool {
        self.company_code
            .as_ref()
            .map_or(true, |c| *c == p.company_code)
            && self.kind.map_or(true, |k| k == p.kind)
            && self.status.map_or(true, |s| s == p.status)
    }
}
