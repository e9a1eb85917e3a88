//! Regulatory filings ("presentaciones")
//!
//! - `types`: the record, its status vocabulary and the filing period
//! - `stock`: holdings line items
//! - `period`: which periods may be filed
//! - `store`: persistence trait and in-memory backend
//! - `lifecycle`: the audited state machine

pub mod lifecycle;
pub mod period;
pub mod stock;
pub mod store;
pub mod types;

pub use lifecycle::{actions, validate_company_code, PresentationLifecycle};
pub use period::{candidate_periods, eligible_periods, EligiblePeriod};
pub use stock::{validate_items, DeferredCheckStock, InvestmentStock, StockItem, TimeDepositStock};
pub use store::{MemoryPresentationStore, PresentationStore};
pub use types::{
    Cronograma, DeliveryKind, Presentation, PresentationFilter, PresentationKey,
    PresentationStatus,
};
