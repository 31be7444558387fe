//! Name re-mapping and per-day movement aggregation

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;

use crate::error::{FillError, FillResult};
use crate::models::{DamageRecord, MovementRecord, ProductIndex};
use crate::types::DayKey;

/// Report abbreviation to template abbreviation.
///
/// Each movement row's good name is resolved against the template's product
/// index; a later row overrides an earlier one for the same report
/// abbreviation. Abbreviations never resolved are absent and keep their own
/// spelling downstream.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationMap {
    map: HashMap<String, String>,
}

impl AbbreviationMap {
    pub fn from_movements(movements: &[MovementRecord], products: &ProductIndex) -> Self {
        let mut map = HashMap::new();
        for movement in movements {
            if let Some(template_abbreviation) = products.resolve(&movement.good_name) {
                map.insert(
                    movement.abbreviation.clone(),
                    template_abbreviation.to_string(),
                );
            }
        }
        Self { map }
    }

    pub fn resolve<'a>(&'a self, report_abbreviation: &'a str) -> &'a str {
        self.map
            .get(report_abbreviation)
            .map(String::as_str)
            .unwrap_or(report_abbreviation)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Opening balances, stock-in and sales keyed by template abbreviation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementTotals {
    pub openings: BTreeMap<String, Decimal>,
    pub stock_in: BTreeMap<DayKey, Decimal>,
    pub sales: BTreeMap<DayKey, Decimal>,
}

impl MovementTotals {
    /// Stock-in days for one abbreviation, in date order
    pub fn stock_in_days<'a>(
        &'a self,
        abbreviation: &'a str,
    ) -> impl Iterator<Item = (&'a DayKey, &'a Decimal)> + 'a {
        self.stock_in
            .iter()
            .filter(move |((_, abr), _)| abr == abbreviation)
    }
}

/// Aggregate the movement report.
///
/// The opening balance of an abbreviation is the book quantity of its
/// chronologically first row (file order breaks ties). Stock-in and sales are
/// summed per day after re-mapping, so two report spellings of one product
/// land in the same bucket.
pub fn aggregate_movements(
    movements: &[MovementRecord],
    abbreviations: &AbbreviationMap,
) -> MovementTotals {
    let mut totals = MovementTotals::default();

    let mut by_date: Vec<&MovementRecord> = movements.iter().collect();
    by_date.sort_by_key(|m| m.date);

    let mut seen: HashSet<&str> = HashSet::new();
    for movement in by_date {
        let abbreviation = abbreviations.resolve(&movement.abbreviation);
        if !seen.insert(abbreviation) {
            continue;
        }
        if let Some(book_quantity) = movement.book_quantity {
            totals
                .openings
                .insert(abbreviation.to_string(), book_quantity);
        }
    }

    for movement in movements {
        let bucket = if movement.is_stock_in() {
            &mut totals.stock_in
        } else if movement.is_invoice_issue() {
            &mut totals.sales
        } else {
            tracing::trace!(
                movement_type = movement.movement_type.as_str(),
                abbreviation = %movement.abbreviation,
                "movement type does not feed the template"
            );
            continue;
        };
        let key = (
            movement.date,
            abbreviations.resolve(&movement.abbreviation).to_string(),
        );
        *bucket.entry(key).or_insert(Decimal::ZERO) += movement.adjusted_amount;
    }

    totals
}

/// Damage quantities per template abbreviation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DamageTotals {
    pub by_abbreviation: BTreeMap<String, u64>,
    /// Damage rows whose good name matched no template product
    pub unmatched: usize,
}

/// Most damage units one abbreviation may carry; each unit is one weighted draw
pub const MAX_DAMAGE_UNITS: u64 = 1_000_000;

/// Resolve damage rows onto template abbreviations and sum them.
///
/// Fails when an abbreviation's total exceeds [`MAX_DAMAGE_UNITS`].
pub fn damage_totals(
    damages: &[DamageRecord],
    products: &ProductIndex,
) -> FillResult<DamageTotals> {
    let mut totals = DamageTotals::default();
    for damage in damages {
        match products.resolve(&damage.good_name) {
            Some(abbreviation) => {
                let sum = totals
                    .by_abbreviation
                    .entry(abbreviation.to_string())
                    .or_insert(0);
                *sum = sum
                    .checked_add(damage.quantity)
                    .filter(|total| *total <= MAX_DAMAGE_UNITS)
                    .ok_or_else(|| FillError::TooManyDamageUnits {
                        abbreviation: abbreviation.to_string(),
                        limit: MAX_DAMAGE_UNITS,
                    })?;
            }
            None => {
                tracing::debug!(good_name = %damage.good_name, "damage row matches no template product");
                totals.unmatched += 1;
            }
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementType;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn movement(
        day: u32,
        abr: &str,
        name: &str,
        kind: MovementType,
        amount: i64,
        book: i64,
    ) -> MovementRecord {
        MovementRecord {
            date: date(day),
            abbreviation: abr.to_string(),
            good_name: name.to_string(),
            movement_type: kind,
            adjusted_amount: Decimal::from(amount),
            book_quantity: Some(Decimal::from(book)),
        }
    }

    fn products() -> ProductIndex {
        let mut products = ProductIndex::default();
        products.insert("Apple Box", "AB1");
        products.insert("Berry Bags", "BB2");
        products
    }

    #[test]
    fn test_opening_is_first_chronological_book_quantity() {
        let movements = vec![
            movement(5, "ab1", "Apple Box", MovementType::StockIn, 300, 412),
            movement(1, "ab1", "Apple Box", MovementType::StockIn, 100, 12),
            movement(1, "ab1", "Apple Box", MovementType::InvoiceIssue, 5, 99),
        ];
        let map = AbbreviationMap::from_movements(&movements, &products());
        let totals = aggregate_movements(&movements, &map);
        assert_eq!(totals.openings.get("AB1"), Some(&Decimal::from(12)));
    }

    #[test]
    fn test_stock_in_and_sales_sum_per_day() {
        let movements = vec![
            movement(1, "AB1", "Apple Box", MovementType::StockIn, 100, 0),
            movement(1, "AB1", "Apple Box", MovementType::StockIn, 20, 0),
            movement(1, "AB1", "Apple Box", MovementType::InvoiceIssue, 7, 0),
            movement(1, "AB1", "Apple Box", MovementType::Other("Transfer".into()), 50, 0),
        ];
        let map = AbbreviationMap::from_movements(&movements, &products());
        let totals = aggregate_movements(&movements, &map);
        let key = (date(1), "AB1".to_string());
        assert_eq!(totals.stock_in.get(&key), Some(&Decimal::from(120)));
        assert_eq!(totals.sales.get(&key), Some(&Decimal::from(7)));
    }

    #[test]
    fn test_report_spellings_merge_after_remap() {
        let movements = vec![
            movement(1, "BB-2", "Berry Bags", MovementType::StockIn, 10, 0),
            movement(1, "bb2", "BERRY BAG", MovementType::StockIn, 5, 0),
        ];
        let map = AbbreviationMap::from_movements(&movements, &products());
        assert_eq!(map.resolve("BB-2"), "BB2");
        assert_eq!(map.resolve("bb2"), "BB2");
        let totals = aggregate_movements(&movements, &map);
        assert_eq!(
            totals.stock_in.get(&(date(1), "BB2".to_string())),
            Some(&Decimal::from(15))
        );
    }

    #[test]
    fn test_unresolved_abbreviation_keeps_spelling() {
        let movements = vec![movement(1, "ZZ9", "Unknown", MovementType::StockIn, 1, 0)];
        let map = AbbreviationMap::from_movements(&movements, &products());
        assert!(map.is_empty());
        let totals = aggregate_movements(&movements, &map);
        assert!(totals.stock_in.contains_key(&(date(1), "ZZ9".to_string())));
    }

    #[test]
    fn test_damage_totals_sum_and_count_unmatched() {
        let damages = vec![
            DamageRecord { good_name: "Apple Box".into(), quantity: 30 },
            DamageRecord { good_name: "apple box".into(), quantity: 10 },
            DamageRecord { good_name: "Mystery".into(), quantity: 3 },
        ];
        let totals = damage_totals(&damages, &products()).unwrap();
        assert_eq!(totals.by_abbreviation.get("AB1"), Some(&40));
        assert_eq!(totals.unmatched, 1);
    }

    #[test]
    fn test_opening_uses_earliest_row_across_spellings() {
        let movements = vec![
            movement(1, "ab-1", "Apple Box", MovementType::StockIn, 100, 25),
            movement(5, "AB1", "Apple Box", MovementType::StockIn, 300, 125),
        ];
        let map = AbbreviationMap::from_movements(&movements, &products());
        let totals = aggregate_movements(&movements, &map);
        assert_eq!(totals.openings.len(), 1);
        assert_eq!(totals.openings.get("AB1"), Some(&Decimal::from(25)));
    }

    #[test]
    fn test_damage_totals_reject_oversized_quantities() {
        let huge = vec![DamageRecord { good_name: "Apple Box".into(), quantity: u64::MAX }];
        let err = damage_totals(&huge, &products()).unwrap_err();
        assert_eq!(
            err,
            FillError::TooManyDamageUnits {
                abbreviation: "AB1".into(),
                limit: MAX_DAMAGE_UNITS
            }
        );

        // two rows that overflow only when added
        let split = vec![
            DamageRecord { good_name: "Apple Box".into(), quantity: u64::MAX / 2 + 1 },
            DamageRecord { good_name: "apple box".into(), quantity: u64::MAX / 2 + 1 },
        ];
        assert!(damage_totals(&split, &products()).is_err());

        let at_limit = vec![DamageRecord { good_name: "Apple Box".into(), quantity: MAX_DAMAGE_UNITS }];
        let totals = damage_totals(&at_limit, &products()).unwrap();
        assert_eq!(totals.by_abbreviation.get("AB1"), Some(&MAX_DAMAGE_UNITS));
    }
}
