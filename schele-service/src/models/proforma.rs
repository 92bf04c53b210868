//! Proforma invoice model for schele-service.

use super::client::Client;
use super::validation::no_duplicates;
use super::work_report::WorkReportWithItems;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Proforma invoice header. Never updated after creation except soft delete.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProformaInvoice {
    pub proforma_invoice_id: Uuid,
    pub number: String,
    pub client_id: Uuid,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

/// Link between a proforma and the work report it bills.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProformaInvoiceItem {
    pub proforma_invoice_item_id: Uuid,
    pub proforma_invoice_id: Uuid,
    pub work_report_id: Uuid,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Proforma line hydrated with its work report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProformaItemDetails {
    #[serde(flatten)]
    pub item: ProformaInvoiceItem,
    pub work_report: WorkReportWithItems,
}

/// Proforma hydrated with its client and billed work reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProformaDetails {
    #[serde(flatten)]
    pub proforma: ProformaInvoice,
    pub client: Client,
    pub items: Vec<ProformaItemDetails>,
}

/// Input for creating a proforma from draft work reports.
#[derive(Debug, Clone, Validate)]
pub struct CreateProforma {
    #[validate(length(min = 1, max = 100))]
    pub number: String,
    pub client_id: Uuid,
    #[validate(length(min = 1), custom(function = "no_duplicates"))]
    pub work_report_ids: Vec<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}
