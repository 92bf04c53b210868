//! Monetary valuation of work report lines.
//!
//! A line is worth `quantity × price`, with the price resolved for the
//! report's project on the valuation date. Lines without a resolvable price
//! contribute zero; the result always says how many such lines there were
//! so callers can surface the gap instead of trusting a short total.

use super::pricing::{PriceBook, PricingKey};
use crate::models::{WorkReportItem, WorkReportWithItems};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

/// Value of a single line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineValue {
    pub work_report_item_id: Uuid,
    pub scaffold_component_id: Uuid,
    pub quantity: Decimal,
    /// `None` when no price applies on the valuation date.
    pub unit_price: Option<Decimal>,
    pub value: Decimal,
}

/// Summed value of a set of lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub total: Decimal,
    pub priced_lines: usize,
    pub unpriced_lines: usize,
    pub price_missing: bool,
}

impl Valuation {
    pub fn from_lines(lines: &[LineValue]) -> Self {
        let mut valuation = Valuation::default();
        for line in lines {
            valuation.add_line(line);
        }
        valuation
    }

    fn add_line(&mut self, line: &LineValue) {
        self.total += line.value;
        if line.unit_price.is_some() {
            self.priced_lines += 1;
        } else {
            self.unpriced_lines += 1;
            self.price_missing = true;
        }
    }

    pub fn merge(&mut self, other: &Valuation) {
        self.total += other.total;
        self.priced_lines += other.priced_lines;
        self.unpriced_lines += other.unpriced_lines;
        self.price_missing |= other.price_missing;
    }
}

/// Date each report is valued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationDate {
    /// Every report at the same date (open/unbilled views).
    Fixed(NaiveDate),
    /// Every report at its own report date (billed views, documents).
    ReportDate,
}

impl ValuationDate {
    fn for_report(&self, report_date: NaiveDate) -> NaiveDate {
        match self {
            ValuationDate::Fixed(date) => *date,
            ValuationDate::ReportDate => report_date,
        }
    }
}

/// Value each line of a report belonging to `project_id` on `as_of`.
pub fn value_lines(
    items: &[WorkReportItem],
    project_id: Uuid,
    as_of: NaiveDate,
    prices: &PriceBook,
) -> Vec<LineValue> {
    items
        .iter()
        .map(|item| {
            let unit_price = prices
                .resolve(project_id, item.scaffold_component_id, as_of)
                .map(|p| p.price);
            if unit_price.is_none() {
                warn!(
                    work_report_id = %item.work_report_id,
                    work_report_item_id = %item.work_report_item_id,
                    scaffold_component_id = %item.scaffold_component_id,
                    project_id = %project_id,
                    as_of = %as_of,
                    "No price applies to work report line, valued at zero"
                );
            }
            LineValue {
                work_report_item_id: item.work_report_item_id,
                scaffold_component_id: item.scaffold_component_id,
                quantity: item.quantity,
                unit_price,
                value: unit_price.map_or(Decimal::ZERO, |price| item.quantity * price),
            }
        })
        .collect()
}

/// Total value of a set of lines.
pub fn value_of(
    items: &[WorkReportItem],
    project_id: Uuid,
    as_of: NaiveDate,
    prices: &PriceBook,
) -> Valuation {
    Valuation::from_lines(&value_lines(items, project_id, as_of, prices))
}

/// Combined value of many reports.
pub fn value_reports(
    reports: &[WorkReportWithItems],
    date: ValuationDate,
    prices: &PriceBook,
) -> Valuation {
    let mut total = Valuation::default();
    for report in reports {
        let as_of = date.for_report(report.report.report_date);
        total.merge(&value_of(
            &report.items,
            report.report.project_id,
            as_of,
            prices,
        ));
    }
    total
}

/// Distinct (project, component) pairs referenced by the reports, so the
/// pricing records for all of them can be fetched in one query.
pub fn pricing_keys(reports: &[WorkReportWithItems]) -> Vec<PricingKey> {
    reports
        .iter()
        .flat_map(|r| {
            r.items
                .iter()
                .map(move |i| (r.report.project_id, i.scaffold_component_id))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
