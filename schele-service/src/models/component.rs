//! Scaffold component (inventory item) model for schele-service.

use super::validation::non_negative;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Reusable inventory item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScaffoldComponent {
    pub scaffold_component_id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub component_type: Option<String>,
    pub total_stock: Decimal,
    pub available_stock: Decimal,
    pub current_project_id: Option<Uuid>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl ScaffoldComponent {
    pub fn stock(&self) -> StockLevels {
        StockLevels {
            total: self.total_stock,
            available: self.available_stock,
        }
    }
}

/// Input for creating a component.
#[derive(Debug, Clone, Validate)]
pub struct CreateComponent {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 100))]
    pub component_type: Option<String>,
    #[validate(custom(function = "non_negative"))]
    pub total_stock: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub available_stock: Decimal,
    pub current_project_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Input for updating a component.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateComponent {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 100))]
    pub component_type: Option<String>,
    #[validate(custom(function = "non_negative"))]
    pub total_stock: Option<Decimal>,
    #[validate(custom(function = "non_negative"))]
    pub available_stock: Option<Decimal>,
    pub current_project_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Stock pair with `available <= total` enforced by clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub total: Decimal,
    pub available: Decimal,
}

impl StockLevels {
    /// Stock for a new component. Available stock above the total is cut down.
    pub fn new(total: Decimal, available: Decimal) -> Self {
        Self {
            total,
            available: available.min(total),
        }
    }

    /// Apply a partial update.
    ///
    /// A lower total drags the available stock down with it; a requested
    /// available stock is capped at whichever total applies after the update.
    pub fn apply(self, total: Option<Decimal>, available: Option<Decimal>) -> Self {
        let total = total.unwrap_or(self.total);
        let available = available.unwrap_or(self.available);
        Self::new(total, available)
    }
}
