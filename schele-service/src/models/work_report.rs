//! Work report model for schele-service.

use super::pricing::UnitOfMeasure;
use super::validation::{non_negative, positive};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Kind of work a report proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Installation,
    Uninstallation,
    Modification,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Installation => "installation",
            WorkType::Uninstallation => "uninstallation",
            WorkType::Modification => "modification",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "uninstallation" => WorkType::Uninstallation,
            "modification" => WorkType::Modification,
            _ => WorkType::Installation,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkType::Installation => "Instalare",
            WorkType::Uninstallation => "Dezinstalare",
            WorkType::Modification => "Modificare",
        }
    }
}

/// Work report status.
///
/// `Cancelled` is part of the schema but no operation moves a report into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkReportStatus {
    Draft,
    Billed,
    Cancelled,
}

impl WorkReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkReportStatus::Draft => "draft",
            WorkReportStatus::Billed => "billed",
            WorkReportStatus::Cancelled => "cancelled",
        }
    }

    /// Unknown values read as `Cancelled` so an unexpected row is never
    /// editable or billable.
    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => WorkReportStatus::Draft,
            "billed" => WorkReportStatus::Billed,
            _ => WorkReportStatus::Cancelled,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkReportStatus::Draft => "Draft",
            WorkReportStatus::Billed => "Facturat",
            WorkReportStatus::Cancelled => "Anulat",
        }
    }
}

/// Work report header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkReport {
    pub work_report_id: Uuid,
    pub number: String,
    pub client_id: Uuid,
    pub project_id: Uuid,
    pub work_type: String,
    pub status: String,
    pub report_date: NaiveDate,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl WorkReport {
    pub fn status(&self) -> WorkReportStatus {
        WorkReportStatus::from_string(&self.status)
    }

    pub fn work_type(&self) -> WorkType {
        WorkType::from_string(&self.work_type)
    }
}

/// Line of a work report. `component_name` is joined from the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkReportItem {
    pub work_report_item_id: Uuid,
    pub work_report_id: Uuid,
    pub scaffold_component_id: Uuid,
    pub component_name: String,
    pub quantity: Decimal,
    pub length: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub unit_of_measure: String,
    pub notes: Option<String>,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

impl WorkReportItem {
    pub fn unit(&self) -> UnitOfMeasure {
        UnitOfMeasure::from_string(&self.unit_of_measure)
    }
}

/// Work report with its ordered lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkReportWithItems {
    #[serde(flatten)]
    pub report: WorkReport,
    pub items: Vec<WorkReportItem>,
}

/// Input for creating a work report.
#[derive(Debug, Clone, Validate)]
pub struct CreateWorkReport {
    #[validate(length(min = 1, max = 100))]
    pub number: String,
    pub client_id: Uuid,
    pub project_id: Uuid,
    pub work_type: WorkType,
    pub report_date: NaiveDate,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Input for updating a draft work report.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateWorkReport {
    #[validate(length(min = 1, max = 100))]
    pub number: Option<String>,
    pub work_type: Option<WorkType>,
    pub report_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Input for adding a line to a draft work report.
#[derive(Debug, Clone, Validate)]
pub struct CreateWorkReportItem {
    pub scaffold_component_id: Uuid,
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub length: Option<Decimal>,
    #[validate(custom(function = "non_negative"))]
    pub weight: Option<Decimal>,
    pub unit_of_measure: UnitOfMeasure,
    pub notes: Option<String>,
}

/// Filter parameters for listing work reports.
#[derive(Debug, Clone, Default)]
pub struct ListWorkReportsFilter {
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub status: Option<WorkReportStatus>,
}
