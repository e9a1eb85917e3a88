//! Holdings line items (monthly stock)
//!
//! Each item is tagged by instrument type. Items belong to exactly one
//! presentation and are replaced wholesale whenever it is processed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::FilingError;

/// A security holding (bonds, shares, mutual fund quotas...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentStock {
    /// Species type as classified by the SSN (e.g. "TP", "ON", "FCI")
    pub species_type: String,
    pub species_code: String,
    pub quantity: Decimal,
    pub accounting_value: Decimal,
    pub market_value: Decimal,
    pub in_custody: bool,
    #[serde(default)]
    pub custodian_code: Option<String>,
    #[serde(default)]
    pub affected_to_reserves: bool,
}

/// A bank time deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDepositStock {
    pub bank_code: String,
    pub deposit_type: String,
    pub issue_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub nominal_value: Decimal,
    pub accounting_value: Decimal,
    pub in_custody: bool,
}

/// A deferred-payment check held in portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCheckStock {
    pub issuer_code: String,
    pub issue_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub nominal_value: Decimal,
    pub accounting_value: Decimal,
}

/// One line item, discriminated by instrument type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "instrument", rename_all = "snake_case")]
pub enum StockItem {
    Investment(InvestmentStock),
    TimeDeposit(TimeDepositStock),
    DeferredCheck(DeferredCheckStock),
}

impl StockItem {
    /// Discriminator used by the SSN payload
    pub fn type_code(&self) -> &'static str {
        match self {
            StockItem::Investment(_) => "I",
            StockItem::TimeDeposit(_) => "P",
            StockItem::DeferredCheck(_) => "C",
        }
    }

    /// Check one item; `position` is 1-based for error messages
    pub fn validate(&self, position: usize) -> Result<(), FilingError> {
        let fail = |msg: &str| {
            Err(FilingError::Validation(format!(
                "item {} ({}): {}",
                position,
                self.type_code(),
                msg
            )))
        };

        match self {
            StockItem::Investment(i) => {
                if i.species_code.trim().is_empty() || i.species_type.trim().is_empty() {
                    return fail("species type and code are required");
                }
                if i.quantity <= Decimal::ZERO {
                    return fail("quantity must be positive");
                }
                if i.accounting_value.is_sign_negative() || i.market_value.is_sign_negative() {
                    return fail("values must not be negative");
                }
                if i.in_custody && i.custodian_code.as_deref().map_or(true, |c| c.trim().is_empty())
                {
                    return fail("custodian code is required for items in custody");
                }
            }
            StockItem::TimeDeposit(d) => {
                if d.bank_code.trim().is_empty() {
                    return fail("bank code is required");
                }
                if d.maturity_date < d.issue_date {
                    return fail("maturity date precedes issue date");
                }
                if d.nominal_value.is_sign_negative() || d.accounting_value.is_sign_negative() {
                    return fail("values must not be negative");
                }
            }
            StockItem::DeferredCheck(c) => {
                if c.issuer_code.trim().is_empty() {
                    return fail("issuer code is required");
                }
                if c.maturity_date < c.issue_date {
                    return fail("maturity date precedes issue date");
                }
                if c.nominal_value.is_sign_negative() || c.accounting_value.is_sign_negative() {
                    return fail("values must not be negative");
                }
            }
        }
        Ok(())
    }

    /// Representation inside the regulator payload
    pub fn to_wire(&self) -> JsonValue {
        let date = |d: &NaiveDate| d.format("%d%m%Y").to_string();
        match self {
            StockItem::Investment(i) => json!({
                "tipo": self.type_code(),
                "tipoEspecie": i.species_type,
                "codigoEspecie": i.species_code,
                "cantidad": i.quantity.to_string(),
                "valorContable": i.accounting_value.to_string(),
                "valorMercado": i.market_value.to_string(),
                "enCustodia": i.in_custody,
                "codigoCustodia": i.custodian_code,
                "afectadaReservas": i.affected_to_reserves,
            }),
            StockItem::TimeDeposit(d) => json!({
                "tipo": self.type_code(),
                "codigoBanco": d.bank_code,
                "tipoDeposito": d.deposit_type,
                "fechaConstitucion": date(&d.issue_date),
                "fechaVencimiento": date(&d.maturity_date),
                "valorNominal": d.nominal_value.to_string(),
                "valorContable": d.accounting_value.to_string(),
                "enCustodia": d.in_custody,
            }),
            StockItem::DeferredCheck(c) => json!({
                "tipo": self.type_code(),
                "codigoEmisor": c.issuer_code,
                "fechaEmision": date(&c.issue_date),
                "fechaVencimiento": date(&c.maturity_date),
                "valorNominal": c.nominal_value.to_string(),
                "valorContable": c.accounting_value.to_string(),
            }),
        }
    }
}

/// Validate a whole batch before anything is written
pub fn validate_items(items: &[StockItem]) -> Result<(), FilingError> {
    items
        .iter()
        .enumerate()
        .try_for_each(|(i, item)| item.validate(i + 1))
}
