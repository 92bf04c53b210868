//! In-memory proforma unit of work.
//!
//! Writes are staged on the unit of work and applied to the shared store
//! only on commit. A failure can be injected at any write step.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use schele_service::billing::ProformaUnitOfWork;
use schele_service::models::{
    Client, CreateProforma, ProformaInvoice, ProformaInvoiceItem, WorkReport, WorkReportItem,
    WorkReportStatus, WorkReportWithItems,
};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Step at which the unit of work fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    InsertProforma,
    /// Zero-based index of the proforma line insert.
    InsertItem(usize),
    /// Zero-based index of the status change.
    SetStatus(usize),
    Commit,
}

#[derive(Default)]
pub struct State {
    pub clients: HashMap<Uuid, Client>,
    pub reports: HashMap<Uuid, WorkReportWithItems>,
    pub proformas: Vec<ProformaInvoice>,
    pub proforma_items: Vec<ProformaInvoiceItem>,
}

/// Shared committed state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, name: &str) -> Client {
        let client = Client {
            client_id: Uuid::new_v4(),
            name: name.to_string(),
            code: None,
            tax_id: None,
            address: None,
            phone: None,
            email: None,
            notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        };
        self.state
            .lock()
            .unwrap()
            .clients
            .insert(client.client_id, client.clone());
        client
    }

    pub fn add_report(&self, client_id: Uuid, number: &str, status: WorkReportStatus) -> Uuid {
        let work_report_id = Uuid::new_v4();
        let report = WorkReport {
            work_report_id,
            number: number.to_string(),
            client_id,
            project_id: Uuid::new_v4(),
            work_type: "installation".to_string(),
            status: status.as_str().to_string(),
            report_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            location: None,
            notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        };
        let item = WorkReportItem {
            work_report_item_id: Uuid::new_v4(),
            work_report_id,
            scaffold_component_id: Uuid::new_v4(),
            component_name: "Cadru 2m".to_string(),
            quantity: Decimal::new(5, 0),
            length: None,
            weight: None,
            unit_of_measure: "piece".to_string(),
            notes: None,
            sort_order: 0,
            created_utc: Utc::now(),
        };
        self.state.lock().unwrap().reports.insert(
            work_report_id,
            WorkReportWithItems {
                report,
                items: vec![item],
            },
        );
        work_report_id
    }

    /// Record an existing claim on a report, as left by a deleted proforma.
    pub fn add_deleted_claim(&self, work_report_id: Uuid) {
        let proforma_invoice_id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.proformas.push(ProformaInvoice {
            proforma_invoice_id,
            number: format!("OLD-{}", proforma_invoice_id),
            client_id: Uuid::new_v4(),
            issue_date: None,
            due_date: None,
            notes: None,
            created_utc: Utc::now(),
            deleted_utc: Some(Utc::now()),
        });
        state.proforma_items.push(ProformaInvoiceItem {
            proforma_invoice_item_id: Uuid::new_v4(),
            proforma_invoice_id,
            work_report_id,
            sort_order: 0,
            created_utc: Utc::now(),
        });
    }

    pub fn status(&self, work_report_id: Uuid) -> WorkReportStatus {
        self.state.lock().unwrap().reports[&work_report_id]
            .report
            .status()
    }

    pub fn proforma_count(&self) -> usize {
        self.state.lock().unwrap().proformas.len()
    }

    pub fn proforma_item_count(&self) -> usize {
        self.state.lock().unwrap().proforma_items.len()
    }

    pub fn begin(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            store: self.clone(),
            fail_at: None,
            proformas: Vec::new(),
            items: Vec::new(),
            statuses: Vec::new(),
        }
    }

    pub fn begin_failing(&self, fail_at: FailAt) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            fail_at: Some(fail_at),
            ..self.begin()
        }
    }
}

pub struct MemoryUnitOfWork {
    store: MemoryStore,
    fail_at: Option<FailAt>,
    proformas: Vec<ProformaInvoice>,
    items: Vec<ProformaInvoiceItem>,
    statuses: Vec<(Uuid, WorkReportStatus)>,
}

impl MemoryUnitOfWork {
    fn check(&self, step: FailAt) -> Result<(), AppError> {
        if self.fail_at == Some(step) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected failure at {:?}",
                step
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProformaUnitOfWork for MemoryUnitOfWork {
    async fn find_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let state = self.store.state.lock().unwrap();
        Ok(state
            .clients
            .get(&client_id)
            .filter(|c| c.deleted_utc.is_none())
            .cloned())
    }

    async fn lock_work_reports(
        &mut self,
        ids: &[Uuid],
    ) -> Result<Vec<WorkReportWithItems>, AppError> {
        let state = self.store.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.reports.get(id))
            .filter(|r| r.report.deleted_utc.is_none())
            .cloned()
            .collect())
    }

    async fn claimed_work_reports(&mut self, ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        let state = self.store.state.lock().unwrap();
        Ok(state
            .proforma_items
            .iter()
            .map(|i| i.work_report_id)
            .filter(|id| ids.contains(id))
            .collect())
    }

    async fn insert_proforma(
        &mut self,
        input: &CreateProforma,
    ) -> Result<ProformaInvoice, AppError> {
        self.check(FailAt::InsertProforma)?;
        let duplicate = self
            .store
            .state
            .lock()
            .unwrap()
            .proformas
            .iter()
            .any(|p| p.deleted_utc.is_none() && p.number == input.number);
        if duplicate {
            return Err(AppError::conflict(format!(
                "Proforma with number '{}' already exists",
                input.number
            )));
        }
        let proforma = ProformaInvoice {
            proforma_invoice_id: Uuid::new_v4(),
            number: input.number.clone(),
            client_id: input.client_id,
            issue_date: input.issue_date,
            due_date: input.due_date,
            notes: input.notes.clone(),
            created_utc: Utc::now(),
            deleted_utc: None,
        };
        self.proformas.push(proforma.clone());
        Ok(proforma)
    }

    async fn insert_proforma_item(
        &mut self,
        proforma_invoice_id: Uuid,
        work_report_id: Uuid,
        sort_order: i32,
    ) -> Result<ProformaInvoiceItem, AppError> {
        self.check(FailAt::InsertItem(self.items.len()))?;
        let item = ProformaInvoiceItem {
            proforma_invoice_item_id: Uuid::new_v4(),
            proforma_invoice_id,
            work_report_id,
            sort_order,
            created_utc: Utc::now(),
        };
        self.items.push(item.clone());
        Ok(item)
    }

    async fn set_work_report_status(
        &mut self,
        work_report_id: Uuid,
        status: WorkReportStatus,
    ) -> Result<(), AppError> {
        self.check(FailAt::SetStatus(self.statuses.len()))?;
        self.statuses.push((work_report_id, status));
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.check(FailAt::Commit)?;
        let mut state = self.store.state.lock().unwrap();
        state.proformas.extend(self.proformas);
        state.proforma_items.extend(self.items);
        for (id, status) in self.statuses {
            if let Some(report) = state.reports.get_mut(&id) {
                report.report.status = status.as_str().to_string();
            }
        }
        Ok(())
    }
}
