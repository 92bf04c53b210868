//! Price resolution for (project, component) pairs.
//!
//! A pricing record applies on a date when the date falls inside its
//! inclusive validity window. Creation rejects overlapping windows, but
//! historical data may still contain duplicates; the resolver then picks
//! the record with the latest `valid_from`, breaking remaining ties by the
//! most recent `created_utc` and finally by id so the choice never depends
//! on row order.

use crate::models::ProjectComponentPricing;
use chrono::NaiveDate;
use service_core::error::AppError;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// (project, component) key used for batched lookups.
pub type PricingKey = (Uuid, Uuid);

fn precedence(a: &ProjectComponentPricing, b: &ProjectComponentPricing) -> Ordering {
    a.valid_from
        .cmp(&b.valid_from)
        .then_with(|| a.created_utc.cmp(&b.created_utc))
        .then_with(|| a.pricing_id.cmp(&b.pricing_id))
}

/// Pick the single record that applies to the pair on `as_of`.
///
/// Returns `None` when nothing matches; whether that is fatal is up to the
/// caller.
pub fn resolve_price<'a, I>(
    records: I,
    project_id: Uuid,
    scaffold_component_id: Uuid,
    as_of: NaiveDate,
) -> Option<&'a ProjectComponentPricing>
where
    I: IntoIterator<Item = &'a ProjectComponentPricing>,
{
    records
        .into_iter()
        .filter(|p| {
            p.is_live()
                && p.project_id == project_id
                && p.scaffold_component_id == scaffold_component_id
                && p.covers(as_of)
        })
        .max_by(|a, b| precedence(a, b))
}

/// First live record of the pair whose window intersects `[from, to]`.
pub fn find_overlap<'a, I>(
    records: I,
    from: NaiveDate,
    to: Option<NaiveDate>,
    exclude: Option<Uuid>,
) -> Option<&'a ProjectComponentPricing>
where
    I: IntoIterator<Item = &'a ProjectComponentPricing>,
{
    records
        .into_iter()
        .filter(|p| p.is_live() && Some(p.pricing_id) != exclude)
        .find(|p| p.overlaps(from, to))
}

/// Reject a window that ends before it starts.
pub fn ensure_window(from: NaiveDate, to: Option<NaiveDate>) -> Result<(), AppError> {
    match to {
        Some(to) if to < from => Err(AppError::validation_failed(
            format!("Pricing window ends ({}) before it starts ({})", to, from),
            Vec::new(),
        )),
        _ => Ok(()),
    }
}

/// Pricing records grouped per pair, loaded once and queried many times.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    by_pair: HashMap<PricingKey, Vec<ProjectComponentPricing>>,
}

impl PriceBook {
    pub fn new(records: impl IntoIterator<Item = ProjectComponentPricing>) -> Self {
        let mut by_pair: HashMap<PricingKey, Vec<ProjectComponentPricing>> = HashMap::new();
        for record in records.into_iter().filter(|r| r.is_live()) {
            by_pair
                .entry((record.project_id, record.scaffold_component_id))
                .or_default()
                .push(record);
        }
        Self { by_pair }
    }

    pub fn resolve(
        &self,
        project_id: Uuid,
        scaffold_component_id: Uuid,
        as_of: NaiveDate,
    ) -> Option<&ProjectComponentPricing> {
        let candidates = self.by_pair.get(&(project_id, scaffold_component_id))?;
        resolve_price(candidates, project_id, scaffold_component_id, as_of)
    }

    pub fn pair_count(&self) -> usize {
        self.by_pair.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn pricing(
        project_id: Uuid,
        component_id: Uuid,
        price: Decimal,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> ProjectComponentPricing {
        ProjectComponentPricing {
            pricing_id: Uuid::new_v4(),
            project_id,
            scaffold_component_id: component_id,
            price,
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
    fn resolves_open_ended_price() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![pricing(p, c, dec!(10.00), date(2024, 1, 1), None)];

        let found = resolve_price(&records, p, c, date(2024, 2, 1)).unwrap();
        assert_eq!(found.price, dec!(10.00));
    }

    #[test]
    fn price_not_yet_valid_is_not_found() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![pricing(p, c, dec!(10.00), date(2024, 3, 1), None)];

        assert!(resolve_price(&records, p, c, date(2024, 2, 1)).is_none());
    }

    #[test]
    fn expired_price_is_not_found() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![pricing(
            p,
            c,
            dec!(10.00),
            date(2024, 1, 1),
            Some(date(2024, 1, 31)),
        )];

        assert!(resolve_price(&records, p, c, date(2024, 1, 31)).is_some());
        assert!(resolve_price(&records, p, c, date(2024, 2, 1)).is_none());
    }

    #[test]
    fn other_pairs_and_deleted_records_are_ignored() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let mut deleted = pricing(p, c, dec!(99), date(2024, 1, 1), None);
        deleted.deleted_utc = Some(Utc::now());
        let records = vec![
            deleted,
            pricing(Uuid::new_v4(), c, dec!(5), date(2024, 1, 1), None),
            pricing(p, Uuid::new_v4(), dec!(6), date(2024, 1, 1), None),
        ];

        assert!(resolve_price(&records, p, c, date(2024, 6, 1)).is_none());
    }

    #[test]
    fn overlapping_records_latest_valid_from_wins() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![
            pricing(p, c, dec!(8.00), date(2024, 1, 1), None),
            pricing(p, c, dec!(12.00), date(2024, 5, 1), None),
            pricing(p, c, dec!(9.00), date(2024, 3, 1), None),
        ];

        let found = resolve_price(&records, p, c, date(2024, 6, 1)).unwrap();
        assert_eq!(found.price, dec!(12.00));

        let earlier = resolve_price(&records, p, c, date(2024, 4, 1)).unwrap();
        assert_eq!(earlier.price, dec!(9.00));
    }

    #[test]
    fn same_valid_from_prefers_newest_record() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let mut older = pricing(p, c, dec!(8.00), date(2024, 1, 1), None);
        older.created_utc = Utc::now() - Duration::days(2);
        let newer = pricing(p, c, dec!(11.00), date(2024, 1, 1), None);

        let forward = vec![older.clone(), newer.clone()];
        let backward = vec![newer, older];
        let a = resolve_price(&forward, p, c, date(2024, 2, 1)).unwrap();
        let b = resolve_price(&backward, p, c, date(2024, 2, 1)).unwrap();
        assert_eq!(a.pricing_id, b.pricing_id);
        assert_eq!(a.price, dec!(11.00));
    }

    #[test]
    fn overlap_check_skips_excluded_record() {
        let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
        let existing = pricing(p, c, dec!(10), date(2024, 1, 1), None);
        let records = vec![existing.clone()];

        assert!(find_overlap(&records, date(2024, 6, 1), None, None).is_some());
        assert!(find_overlap(&records, date(2024, 6, 1), None, Some(existing.pricing_id)).is_none());
        assert!(find_overlap(&records, date(2023, 1, 1), Some(date(2023, 12, 31)), None).is_none());
    }

    #[test]
    fn window_must_not_end_before_it_starts() {
        assert!(ensure_window(date(2024, 1, 1), None).is_ok());
        assert!(ensure_window(date(2024, 1, 1), Some(date(2024, 1, 1))).is_ok());
        assert!(matches!(
            ensure_window(date(2024, 1, 2), Some(date(2024, 1, 1))),
            Err(AppError::ValidationFailed(..))
        ));
    }

    #[test]
    fn price_book_groups_by_pair() {
        let (p, c1, c2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let book = PriceBook::new(vec![
            pricing(p, c1, dec!(10), date(2024, 1, 1), None),
            pricing(p, c2, dec!(20), date(2024, 1, 1), None),
            pricing(p, c2, dec!(25), date(2024, 7, 1), None),
        ]);

        assert_eq!(book.pair_count(), 2);
        assert_eq!(book.resolve(p, c2, date(2024, 8, 1)).unwrap().price, dec!(25));
        assert_eq!(book.resolve(p, c2, date(2024, 2, 1)).unwrap().price, dec!(20));
        assert!(book.resolve(p, Uuid::new_v4(), date(2024, 2, 1)).is_none());
    }

    proptest! {
        #[test]
        fn resolved_record_covers_date_and_has_latest_start(
            starts in proptest::collection::vec(0i64..365, 1..8),
            lengths in proptest::collection::vec(proptest::option::of(0i64..120), 8),
            day_offset in 0i64..500,
        ) {
            let (p, c) = (Uuid::new_v4(), Uuid::new_v4());
            let base = date(2024, 1, 1);
            let records: Vec<_> = starts
                .iter()
                .zip(lengths.iter())
                .map(|(s, len)| {
                    let from = base + Duration::days(*s);
                    let to = len.map(|l| from + Duration::days(l));
                    pricing(p, c, dec!(1), from, to)
                })
                .collect();
            let as_of = base + Duration::days(day_offset);

            match resolve_price(&records, p, c, as_of) {
                Some(found) => {
                    prop_assert!(found.covers(as_of));
                    for other in records.iter().filter(|r| r.covers(as_of)) {
                        prop_assert!(other.valid_from <= found.valid_from);
                    }
                }
                None => prop_assert!(records.iter().all(|r| !r.covers(as_of))),
            }
        }
    }
}
