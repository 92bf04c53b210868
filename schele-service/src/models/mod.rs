//! Domain models for schele-service.

mod client;
mod component;
mod contract;
mod dashboard;
mod pricing;
mod proforma;
mod project;
mod validation;
mod work_report;

pub use client::{Client, CreateClient, UpdateClient};
pub use component::{CreateComponent, ScaffoldComponent, StockLevels, UpdateComponent};
pub use contract::{Contract, CreateContract, UpdateContract};
pub use dashboard::DashboardSummary;
pub use pricing::{
    CreatePricing, ListPricingsFilter, ProjectComponentPricing, UnitOfMeasure, UpdatePricing,
};
pub use proforma::{
    CreateProforma, ProformaDetails, ProformaInvoice, ProformaInvoiceItem, ProformaItemDetails,
};
pub use project::{CreateProject, Project, UpdateProject};
pub use work_report::{
    CreateWorkReport, CreateWorkReportItem, ListWorkReportsFilter, UpdateWorkReport, WorkReport,
    WorkReportItem, WorkReportStatus, WorkReportWithItems, WorkType,
};
