//! Work report billing lifecycle.
//!
//! DRAFT is the only editable state. DRAFT moves to BILLED either through
//! an explicit bill or through inclusion in a proforma; BILLED reports are
//! frozen. CANCELLED exists in the schema but nothing transitions into it.

use crate::models::{WorkReport, WorkReportStatus};
use service_core::error::AppError;

/// Edit applied to a work report or its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    UpdateFields,
    AddItem,
    RemoveItem,
}

impl Edit {
    fn describe(&self) -> &'static str {
        match self {
            Edit::UpdateFields => "update",
            Edit::AddItem => "add lines to",
            Edit::RemoveItem => "remove lines from",
        }
    }
}

/// Fail unless the report may still be edited.
pub fn ensure_editable(report: &WorkReport, edit: Edit) -> Result<(), AppError> {
    match report.status() {
        WorkReportStatus::Draft => Ok(()),
        status => Err(AppError::precondition_failed(
            format!(
                "Cannot {} work report {} in status {}",
                edit.describe(),
                report.number,
                status.as_str()
            ),
            report.work_report_id,
        )),
    }
}

/// Status a report moves to when billed on its own.
///
/// Requires DRAFT and at least one line.
pub fn bill(report: &WorkReport, item_count: usize) -> Result<WorkReportStatus, AppError> {
    match report.status() {
        WorkReportStatus::Draft if item_count == 0 => Err(AppError::precondition_failed(
            format!(
                "Work report {} must have at least one line to be billed",
                report.number
            ),
            report.work_report_id,
        )),
        WorkReportStatus::Draft => Ok(WorkReportStatus::Billed),
        WorkReportStatus::Billed => Err(AppError::precondition_failed(
            format!("Work report {} is already billed", report.number),
            report.work_report_id,
        )),
        WorkReportStatus::Cancelled => Err(AppError::precondition_failed(
            format!("Work report {} is cancelled and cannot be billed", report.number),
            report.work_report_id,
        )),
    }
}

/// Status a report moves to when a proforma claims it.
///
/// Same DRAFT to BILLED flip as [`bill`], without the line-count rule.
pub fn claim(report: &WorkReport) -> Result<WorkReportStatus, AppError> {
    match report.status() {
        WorkReportStatus::Draft => Ok(WorkReportStatus::Billed),
        status => Err(AppError::precondition_failed(
            format!(
                "Work report {} in status {} cannot be included in a proforma",
                report.number,
                status.as_str()
            ),
            report.work_report_id,
        )),
    }
}
