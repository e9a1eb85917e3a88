//! Which periods a company may open a filing for
//!
//! The window is a fixed policy: for monthly filings, the two most recently
//! completed calendar months; for weekly filings, the two most recently
//! completed ISO weeks. Periods are listed newest first. A period whose filing
//! is in a blocking status is dropped; one with a non-blocking filing stays in
//! the list, annotated with that status.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use super::types::{Cronograma, DeliveryKind, PresentationStatus};

/// How many completed periods back the window reaches
const WINDOW: u32 = 2;

/// A period offered for a new filing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligiblePeriod {
    pub cronograma: String,
    /// Status of an existing non-blocking filing for this period
    pub existing_status: Option<PresentationStatus>,
}

/// Window bounds, newest and oldest, inclusive
fn window_bounds(kind: DeliveryKind, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    match kind {
        DeliveryKind::Monthly => {
            let first_of_month = today.with_day(1)?;
            let upper = first_of_month.checked_sub_months(Months::new(1))?;
            let lower = first_of_month.checked_sub_months(Months::new(WINDOW))?;
            Some((upper, lower))
        }
        DeliveryKind::Weekly => {
            let monday = today.checked_sub_days(Days::new(
                today.weekday().num_days_from_monday() as u64,
            ))?;
            let upper = monday.checked_sub_days(Days::new(7))?;
            let lower = monday.checked_sub_days(Days::new(7 * WINDOW as u64))?;
            Some((upper, lower))
        }
    }
}

fn step_back(kind: DeliveryKind, cursor: NaiveDate) -> Option<NaiveDate> {
    match kind {
        DeliveryKind::Monthly => cursor.checked_sub_months(Months::new(1)),
        DeliveryKind::Weekly => cursor.checked_sub_days(Days::new(7)),
    }
}

/// Periods inside the policy window, newest first
pub fn candidate_periods(kind: DeliveryKind, today: NaiveDate) -> Vec<Cronograma> {
    let Some((upper, lower)) = window_bounds(kind, today) else {
        return Vec::new();
    };

    let mut periods = Vec::new();
    let mut cursor = Some(upper);
    while let Some(date) = cursor {
        if date < lower {
            break;
        }
        periods.push(match kind {
            DeliveryKind::Monthly => Cronograma::month_of(date),
            DeliveryKind::Weekly => Cronograma::week_of(date),
        });
        cursor = step_back(kind, date);
    }
    periods
}

/// Apply existing filings to the candidate window.
///
/// `existing` holds `(cronograma, status)` for the company and kind in
/// question.
pub fn eligible_periods(
    kind: DeliveryKind,
    today: NaiveDate,
    existing: &[(String, PresentationStatus)],
) -> Vec<EligiblePeriod> {
    candidate_periods(kind, today)
        .into_iter()
        .filter_map(|period| {
            let cronograma = period.to_string();
            let statuses: Vec<PresentationStatus> = existing
                .iter()
                .filter(|(c, _)| *c == cronograma)
                .map(|(_, s)| *s)
                .collect();

            if statuses.iter().any(PresentationStatus::is_blocking) {
                return None;
            }
            Some(EligiblePeriod {
                cronograma,
                existing_status: statuses.first().copied(),
            })
        })
        .collect()
}
