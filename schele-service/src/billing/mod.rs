//! Billing core: price resolution, valuation, the work report lifecycle,
//! proforma assembly and printable documents.

pub mod documents;
pub mod lifecycle;
pub mod pricing;
pub mod proforma;
pub mod valuation;

pub use documents::{ContractDocument, ProformaDocument, WorkReportDocument};
pub use lifecycle::Edit;
pub use pricing::{ensure_window, find_overlap, resolve_price, PriceBook, PricingKey};
pub use proforma::{create_proforma, validate_candidates, ProformaUnitOfWork};
pub use valuation::{pricing_keys, value_reports, LineValue, Valuation, ValuationDate};
