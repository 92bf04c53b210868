//! Project component pricing model for schele-service.

use super::validation::positive;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Unit a quantity or a price is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Meter,
    Kilogram,
    Piece,
    SquareMeter,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Meter => "meter",
            UnitOfMeasure::Kilogram => "kilogram",
            UnitOfMeasure::Piece => "piece",
            UnitOfMeasure::SquareMeter => "square_meter",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "meter" => UnitOfMeasure::Meter,
            "kilogram" => UnitOfMeasure::Kilogram,
            "square_meter" => UnitOfMeasure::SquareMeter,
            _ => UnitOfMeasure::Piece,
        }
    }

    /// Short label printed on documents.
    pub fn label(&self) -> &'static str {
        match self {
            UnitOfMeasure::Meter => "m",
            UnitOfMeasure::Kilogram => "kg",
            UnitOfMeasure::Piece => "buc",
            UnitOfMeasure::SquareMeter => "m²",
        }
    }
}

/// Price of a component within a project over an inclusive date window.
/// `valid_to = None` leaves the window open-ended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectComponentPricing {
    pub pricing_id: Uuid,
    pub project_id: Uuid,
    pub scaffold_component_id: Uuid,
    pub price: Decimal,
    pub unit_of_measure: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl ProjectComponentPricing {
    pub fn unit(&self) -> UnitOfMeasure {
        UnitOfMeasure::from_string(&self.unit_of_measure)
    }

    pub fn is_live(&self) -> bool {
        self.deleted_utc.is_none()
    }

    /// Whether `as_of` falls inside the validity window.
    pub fn covers(&self, as_of: NaiveDate) -> bool {
        self.valid_from <= as_of && self.valid_to.is_none_or(|to| to >= as_of)
    }

    /// Whether the window shares at least one day with `[from, to]`.
    pub fn overlaps(&self, from: NaiveDate, to: Option<NaiveDate>) -> bool {
        let starts_before_other_ends = to.is_none_or(|to| self.valid_from <= to);
        let ends_after_other_starts = self.valid_to.is_none_or(|own_to| own_to >= from);
        starts_before_other_ends && ends_after_other_starts
    }
}

/// Input for creating a pricing record.
#[derive(Debug, Clone, Validate)]
pub struct CreatePricing {
    pub project_id: Uuid,
    pub scaffold_component_id: Uuid,
    #[validate(custom(function = "positive"))]
    pub price: Decimal,
    pub unit_of_measure: UnitOfMeasure,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for updating a pricing record.
///
/// `valid_to: Some(None)` reopens the window; `None` leaves it unchanged.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdatePricing {
    #[validate(custom(function = "positive"))]
    pub price: Option<Decimal>,
    pub unit_of_measure: Option<UnitOfMeasure>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<Option<NaiveDate>>,
    pub notes: Option<String>,
}

/// Filter parameters for listing pricings.
#[derive(Debug, Clone, Default)]
pub struct ListPricingsFilter {
    pub project_id: Option<Uuid>,
    pub scaffold_component_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pricing(from: NaiveDate, to: Option<NaiveDate>) -> ProjectComponentPricing {
        ProjectComponentPricing {
            pricing_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            scaffold_component_id: Uuid::new_v4(),
            price: dec!(10.00),
            unit_of_measure: "piece".to_string(),
            valid_from: from,
            valid_to: to,
            notes: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            deleted_utc: None,
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let p = pricing(date(2024, 1, 1), Some(date(2024, 1, 31)));
        assert!(p.covers(date(2024, 1, 1)));
        assert!(p.covers(date(2024, 1, 31)));
        assert!(!p.covers(date(2023, 12, 31)));
        assert!(!p.covers(date(2024, 2, 1)));
    }

    #[test]
    fn open_window_covers_future() {
        let p = pricing(date(2024, 3, 1), None);
        assert!(p.covers(date(2030, 1, 1)));
        assert!(!p.covers(date(2024, 2, 1)));
    }

    #[test]
    fn overlap_detection() {
        let p = pricing(date(2024, 1, 1), Some(date(2024, 1, 31)));
        assert!(p.overlaps(date(2024, 1, 31), None));
        assert!(p.overlaps(date(2023, 6, 1), Some(date(2024, 1, 1))));
        assert!(!p.overlaps(date(2024, 2, 1), None));
        assert!(!p.overlaps(date(2023, 1, 1), Some(date(2023, 12, 31))));

        let open = pricing(date(2024, 1, 1), None);
        assert!(open.overlaps(date(2025, 1, 1), Some(date(2025, 2, 1))));
        assert!(!open.overlaps(date(2023, 1, 1), Some(date(2023, 12, 31))));
    }

    #[test]
    fn price_must_be_positive() {
        let input = CreatePricing {
            project_id: Uuid::new_v4(),
            scaffold_component_id: Uuid::new_v4(),
            price: dec!(0),
            unit_of_measure: UnitOfMeasure::Piece,
            valid_from: date(2024, 1, 1),
            valid_to: None,
            notes: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn unit_labels() {
        assert_eq!(UnitOfMeasure::from_string("square_meter").label(), "m²");
        assert_eq!(UnitOfMeasure::Piece.as_str(), "piece");
    }
}
