//! PostgreSQL unit of work for proforma creation.

use super::metrics::DB_QUERY_DURATION;
use super::sql::{
    active, attach_items, is_unique_violation, items_for_reports, CLIENT_COLUMNS,
    PROFORMA_COLUMNS, PROFORMA_ITEM_COLUMNS, WORK_REPORT_COLUMNS,
};
use crate::billing::ProformaUnitOfWork;
use crate::models::{
    Client, CreateProforma, ProformaInvoice, ProformaInvoiceItem, WorkReport, WorkReportStatus,
    WorkReportWithItems,
};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

/// Wraps one database transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    pub async fn begin(pool: &PgPool) -> Result<Self, AppError> {
        let tx = pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        Ok(Self { tx })
    }
}

#[async_trait]
impl ProformaUnitOfWork for PgUnitOfWork {
    async fn find_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(&format!(
            "{} AND client_id = $1",
            active(CLIENT_COLUMNS, "clients")
        ))
        .bind(client_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))
    }

    async fn lock_work_reports(
        &mut self,
        ids: &[Uuid],
    ) -> Result<Vec<WorkReportWithItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_work_reports"])
            .start_timer();

        // Fixed lock order so concurrent proformas over overlapping sets
        // cannot deadlock.
        let reports = sqlx::query_as::<_, WorkReport>(&format!(
            "{} AND work_report_id = ANY($1) ORDER BY work_report_id FOR UPDATE",
            active(WORK_REPORT_COLUMNS, "work_reports")
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock work reports: {}", e))
        })?;

        let report_ids: Vec<Uuid> = reports.iter().map(|r| r.work_report_id).collect();
        let items = items_for_reports(&mut *self.tx, &report_ids).await?;

        timer.observe_duration();
        debug!(locked = reports.len(), "Work reports locked");

        Ok(attach_items(reports, items))
    }

    async fn claimed_work_reports(&mut self, ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT work_report_id
            FROM proforma_invoice_items
            WHERE work_report_id = ANY($1)
            ORDER BY work_report_id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check proforma claims: {}", e))
        })
    }

    async fn insert_proforma(
        &mut self,
        input: &CreateProforma,
    ) -> Result<ProformaInvoice, AppError> {
        sqlx::query_as::<_, ProformaInvoice>(&format!(
            r#"
            INSERT INTO proforma_invoices (proforma_invoice_id, number, client_id, issue_date, due_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PROFORMA_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.number)
        .bind(input.client_id)
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(&input.notes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "Proforma with number '{}' already exists",
                    input.number
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create proforma: {}", e))
            }
        })
    }

    async fn insert_proforma_item(
        &mut self,
        proforma_invoice_id: Uuid,
        work_report_id: Uuid,
        sort_order: i32,
    ) -> Result<ProformaInvoiceItem, AppError> {
        sqlx::query_as::<_, ProformaInvoiceItem>(&format!(
            r#"
            INSERT INTO proforma_invoice_items (proforma_invoice_item_id, proforma_invoice_id, work_report_id, sort_order)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            PROFORMA_ITEM_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(proforma_invoice_id)
        .bind(work_report_id)
        .bind(sort_order)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(
                    format!(
                        "Work report {} is already included in a proforma",
                        work_report_id
                    ),
                    vec![work_report_id],
                )
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to add proforma item: {}", e))
            }
        })
    }

    async fn set_work_report_status(
        &mut self,
        work_report_id: Uuid,
        status: WorkReportStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE work_reports SET status = $2, updated_utc = NOW() WHERE work_report_id = $1",
        )
        .bind(work_report_id)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update work report status: {}", e))
        })?;
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }
}
