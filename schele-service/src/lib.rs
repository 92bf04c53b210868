//! Schele service library.
//!
//! Billing core for a scaffolding-rental business: work reports priced per
//! project and component, billed either one by one or grouped into
//! proforma invoices.

pub mod billing;
pub mod config;
pub mod models;
pub mod services;
pub mod startup;
