//! Shared SQL fragments.
//!
//! Every read of a soft-deletable table starts from [`active`], so deleted
//! rows are filtered in one place.

use crate::models::{WorkReport, WorkReportItem, WorkReportWithItems};
use service_core::error::AppError;
use sqlx::PgExecutor;
use std::collections::HashMap;
use uuid::Uuid;

pub const CLIENT_COLUMNS: &str =
    "client_id, name, code, tax_id, address, phone, email, notes, created_utc, updated_utc, deleted_utc";

pub const CONTRACT_COLUMNS: &str = "contract_id, number, client_id, contract_date, start_date, end_date, location, description, terms, supplier_name, supplier_tax_id, supplier_address, supplier_phone, supplier_email, supplier_bank_account, supplier_bank_name, notes, created_utc, updated_utc, deleted_utc";

pub const PROJECT_COLUMNS: &str =
    "project_id, client_id, name, code, location, description, created_utc, updated_utc, deleted_utc";

pub const COMPONENT_COLUMNS: &str = "scaffold_component_id, name, code, component_type, total_stock, available_stock, current_project_id, location, notes, created_utc, updated_utc, deleted_utc";

pub const PRICING_COLUMNS: &str = "pricing_id, project_id, scaffold_component_id, price, unit_of_measure, valid_from, valid_to, notes, created_utc, updated_utc, deleted_utc";

pub const WORK_REPORT_COLUMNS: &str = "work_report_id, number, client_id, project_id, work_type, status, report_date, location, notes, created_utc, updated_utc, deleted_utc";

pub const PROFORMA_COLUMNS: &str =
    "proforma_invoice_id, number, client_id, issue_date, due_date, notes, created_utc, deleted_utc";

pub const PROFORMA_ITEM_COLUMNS: &str =
    "proforma_invoice_item_id, proforma_invoice_id, work_report_id, sort_order, created_utc";

/// `SELECT <columns> FROM <table>` restricted to rows that are not
/// soft-deleted. Callers append further conditions with `AND`.
pub fn active(columns: &str, table: &str) -> String {
    format!("SELECT {} FROM {} WHERE deleted_utc IS NULL", columns, table)
}

/// Lines of the given reports, component name joined in, in display order.
pub async fn items_for_reports<'e, E>(
    executor: E,
    work_report_ids: &[Uuid],
) -> Result<Vec<WorkReportItem>, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WorkReportItem>(
        r#"
        SELECT i.work_report_item_id, i.work_report_id, i.scaffold_component_id,
               c.name AS component_name, i.quantity, i.length, i.weight,
               i.unit_of_measure, i.notes, i.sort_order, i.created_utc
        FROM work_report_items i
        JOIN scaffold_components c ON c.scaffold_component_id = i.scaffold_component_id
        WHERE i.work_report_id = ANY($1)
        ORDER BY i.work_report_id, i.sort_order, i.created_utc
        "#,
    )
    .bind(work_report_ids)
    .fetch_all(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load work report items: {}", e)))
}

/// Attach lines to their reports, keeping the order of `reports`.
pub fn attach_items(
    reports: Vec<WorkReport>,
    items: Vec<WorkReportItem>,
) -> Vec<WorkReportWithItems> {
    let mut by_report: HashMap<Uuid, Vec<WorkReportItem>> = HashMap::new();
    for item in items {
        by_report.entry(item.work_report_id).or_default().push(item);
    }
    reports
        .into_iter()
        .map(|report| {
            let items = by_report.remove(&report.work_report_id).unwrap_or_default();
            WorkReportWithItems { report, items }
        })
        .collect()
}

/// Whether a store error is a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
