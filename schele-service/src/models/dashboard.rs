//! Dashboard summary model for schele-service.

use crate::billing::Valuation;
use serde::{Deserialize, Serialize};

/// Live record counts and the two aggregate valuations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_clients: i64,
    pub total_projects: i64,
    pub total_components: i64,
    pub total_work_reports: i64,
    pub unbilled_work_reports: i64,
    pub total_proformas: i64,
    /// Draft work reports valued at the requested date.
    pub unbilled_value: Valuation,
    /// Work reports behind live proformas, each valued at its report date.
    pub proformas_value: Valuation,
}
