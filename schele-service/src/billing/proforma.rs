//! Proforma creation.
//!
//! Every check runs against rows read through the unit of work, before any
//! write. The writes then go through the same unit of work and only become
//! visible on commit, so a failure at any point leaves no proforma, no
//! proforma line and no status change behind.

use super::lifecycle;
use crate::models::{
    Client, CreateProforma, ProformaDetails, ProformaInvoice, ProformaInvoiceItem,
    ProformaItemDetails, WorkReportStatus, WorkReportWithItems,
};
use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Transactional scope for one proforma creation attempt.
///
/// Dropping the value without calling [`commit`](Self::commit) discards
/// every write made through it.
#[async_trait]
pub trait ProformaUnitOfWork: Send {
    /// Live client by id.
    async fn find_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    /// Live work reports among `ids`, with their lines. Implementations keep
    /// the returned rows locked against concurrent writers until the unit of
    /// work ends.
    async fn lock_work_reports(
        &mut self,
        ids: &[Uuid],
    ) -> Result<Vec<WorkReportWithItems>, AppError>;

    /// Ids among `ids` already referenced by a proforma line, deleted
    /// proformas included.
    async fn claimed_work_reports(&mut self, ids: &[Uuid]) -> Result<Vec<Uuid>, AppError>;

    async fn insert_proforma(&mut self, input: &CreateProforma)
        -> Result<ProformaInvoice, AppError>;

    async fn insert_proforma_item(
        &mut self,
        proforma_invoice_id: Uuid,
        work_report_id: Uuid,
        sort_order: i32,
    ) -> Result<ProformaInvoiceItem, AppError>;

    async fn set_work_report_status(
        &mut self,
        work_report_id: Uuid,
        status: WorkReportStatus,
    ) -> Result<(), AppError>;

    async fn commit(self) -> Result<(), AppError>;
}

/// Check a candidate set of work reports against the proforma request.
///
/// Failures are reported in a fixed order: unknown ids, mixed clients,
/// client mismatch, already billed, not claimable, already claimed.
pub fn validate_candidates(
    input: &CreateProforma,
    reports: &[WorkReportWithItems],
    claimed: &[Uuid],
) -> Result<(), AppError> {
    let found: HashSet<Uuid> = reports.iter().map(|r| r.report.work_report_id).collect();
    let missing: Vec<Uuid> = input
        .work_report_ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::NotFound(
            format!("Work reports not found: {}", join_ids(&missing)),
            missing,
        ));
    }

    let client_ids: BTreeSet<Uuid> = reports.iter().map(|r| r.report.client_id).collect();
    if client_ids.len() > 1 {
        return Err(AppError::validation_failed(
            "All work reports must belong to the same client",
            report_ids(reports),
        ));
    }

    if client_ids.iter().any(|id| *id != input.client_id) {
        return Err(AppError::validation_failed(
            format!(
                "Work reports do not belong to client {} of the proforma",
                input.client_id
            ),
            report_ids(reports),
        ));
    }

    let billed: Vec<Uuid> = reports
        .iter()
        .filter(|r| r.report.status() == WorkReportStatus::Billed)
        .map(|r| r.report.work_report_id)
        .collect();
    if !billed.is_empty() {
        return Err(AppError::ValidationFailed(
            format!("Work reports already billed: {}", join_ids(&billed)),
            billed,
        ));
    }

    for report in reports {
        lifecycle::claim(&report.report)?;
    }

    if !claimed.is_empty() {
        return Err(AppError::ValidationFailed(
            format!(
                "Work reports already included in another proforma: {}",
                join_ids(claimed)
            ),
            claimed.to_vec(),
        ));
    }

    Ok(())
}

/// Create a proforma and bill every included work report, atomically.
#[instrument(
    skip(uow, input),
    fields(number = %input.number, client_id = %input.client_id, work_reports = input.work_report_ids.len())
)]
pub async fn create_proforma<U: ProformaUnitOfWork>(
    mut uow: U,
    input: CreateProforma,
) -> Result<ProformaDetails, AppError> {
    input.validate()?;

    let client = uow.find_client(input.client_id).await?.ok_or_else(|| {
        AppError::not_found(
            format!("Client {} not found", input.client_id),
            input.client_id,
        )
    })?;

    let reports = uow.lock_work_reports(&input.work_report_ids).await?;
    let claimed = uow.claimed_work_reports(&input.work_report_ids).await?;
    validate_candidates(&input, &reports, &claimed)?;

    let proforma = uow.insert_proforma(&input).await?;

    let mut items = Vec::with_capacity(input.work_report_ids.len());
    for (position, work_report_id) in input.work_report_ids.iter().enumerate() {
        let report = reports
            .iter()
            .find(|r| r.report.work_report_id == *work_report_id)
            .cloned()
            .ok_or_else(|| {
                AppError::not_found(
                    format!("Work report {} not found", work_report_id),
                    *work_report_id,
                )
            })?;
        let next_status = lifecycle::claim(&report.report)?;

        let item = uow
            .insert_proforma_item(proforma.proforma_invoice_id, *work_report_id, position as i32)
            .await?;
        uow.set_work_report_status(*work_report_id, next_status)
            .await?;

        let mut work_report = report;
        work_report.report.status = next_status.as_str().to_string();
        items.push(ProformaItemDetails { item, work_report });
    }

    uow.commit().await?;

    info!(
        proforma_invoice_id = %proforma.proforma_invoice_id,
        number = %proforma.number,
        work_reports = items.len(),
        "Proforma created, work reports billed"
    );

    Ok(ProformaDetails {
        proforma,
        client,
        items,
    })
}

fn report_ids(reports: &[WorkReportWithItems]) -> Vec<Uuid> {
    reports.iter().map(|r| r.report.work_report_id).collect()
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
