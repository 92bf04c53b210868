//! Rental contract model for schele-service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Scaffolding rental contract between the supplier and a client.
///
/// Supplier fields are copied onto the contract when it is created, so a
/// later change of supplier settings does not alter signed contracts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contract {
    pub contract_id: Uuid,
    pub number: String,
    pub client_id: Uuid,
    pub contract_date: NaiveDate,
    pub start_date: NaiveDate,
    /// `None` means the contract runs for an indefinite period.
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub terms: Option<String>,
    pub supplier_name: String,
    pub supplier_tax_id: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_phone: Option<String>,
    pub supplier_email: Option<String>,
    pub supplier_bank_account: Option<String>,
    pub supplier_bank_name: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

/// Input for creating a contract.
///
/// `contract_date` defaults to `start_date`. Supplier fields left unset
/// are taken from the configured supplier.
#[derive(Debug, Clone, Validate)]
pub struct CreateContract {
    #[validate(length(min = 1, max = 100))]
    pub number: String,
    pub client_id: Uuid,
    pub contract_date: Option<NaiveDate>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub description: Option<String>,
    pub terms: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub supplier_name: Option<String>,
    #[validate(length(max = 50))]
    pub supplier_tax_id: Option<String>,
    #[validate(length(max = 500))]
    pub supplier_address: Option<String>,
    #[validate(length(max = 50))]
    pub supplier_phone: Option<String>,
    #[validate(email, length(max = 255))]
    pub supplier_email: Option<String>,
    #[validate(length(max = 100))]
    pub supplier_bank_account: Option<String>,
    #[validate(length(max = 255))]
    pub supplier_bank_name: Option<String>,
    pub notes: Option<String>,
}

/// Input for updating a contract. `None` leaves a field unchanged;
/// `end_date: Some(None)` makes the period indefinite.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateContract {
    #[validate(length(min = 1, max = 100))]
    pub number: Option<String>,
    pub contract_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub description: Option<String>,
    pub terms: Option<String>,
    pub notes: Option<String>,
}
