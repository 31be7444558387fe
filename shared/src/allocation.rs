//! Stock-weighted damage allocation and expected-quantity perturbation

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::MovementTotals;
use crate::error::{FillError, FillResult};

/// Total damage split into its two categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageSplit {
    pub production: u64,
    pub packaging: u64,
}

impl DamageSplit {
    /// Production takes `floor(total * 3 / 4)`, packaging the remainder.
    pub fn of(total: u64) -> Self {
        let production = total / 4 * 3 + total % 4 * 3 / 4;
        Self {
            production,
            packaging: total - production,
        }
    }

    pub fn total(&self) -> u64 {
        self.production + self.packaging
    }
}

/// Damages drawn onto each stock-in day, per template abbreviation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageAllocation {
    by_abbreviation: BTreeMap<String, BTreeMap<NaiveDate, DamageSplit>>,
    /// Abbreviations with damages but nothing to weight them by
    pub skipped: Vec<String>,
}

impl DamageAllocation {
    /// Damages for one day; zero when nothing was drawn there
    pub fn for_day(&self, abbreviation: &str, date: NaiveDate) -> DamageSplit {
        self.by_abbreviation
            .get(abbreviation)
            .and_then(|days| days.get(&date))
            .copied()
            .unwrap_or_default()
    }

    pub fn days(&self, abbreviation: &str) -> Option<&BTreeMap<NaiveDate, DamageSplit>> {
        self.by_abbreviation.get(abbreviation)
    }

    /// Units allocated across every abbreviation and day
    pub fn total_units(&self) -> u64 {
        self.by_abbreviation
            .values()
            .flat_map(|days| days.values())
            .map(DamageSplit::total)
            .sum()
    }
}

/// Spread each abbreviation's damages over its stock-in days.
///
/// Every unit is drawn independently with probability proportional to that
/// day's stock-in, production units first, then packaging units. Per-day
/// counts are random; the per-abbreviation totals are exact. Abbreviations
/// with no stock-in days, or whose stock-in sums to zero, are skipped.
pub fn allocate_damages<R: Rng + ?Sized>(
    damages: &BTreeMap<String, u64>,
    movements: &MovementTotals,
    rng: &mut R,
) -> FillResult<DamageAllocation> {
    let mut allocation = DamageAllocation::default();

    for (abbreviation, &total) in damages {
        if total == 0 {
            continue;
        }

        let (days, stock): (Vec<NaiveDate>, Vec<Decimal>) = movements
            .stock_in_days(abbreviation)
            .map(|((date, _), qty)| (*date, *qty))
            .unzip();
        let total_stock: Decimal = stock.iter().copied().sum();
        if days.is_empty() || total_stock.is_zero() {
            tracing::debug!(%abbreviation, total, "no stock-in to weight damages by");
            allocation.skipped.push(abbreviation.clone());
            continue;
        }

        if let Some(i) = stock.iter().position(|qty| qty.is_sign_negative() && !qty.is_zero()) {
            return Err(FillError::NegativeStockIn {
                abbreviation: abbreviation.clone(),
                date: days[i],
            });
        }

        let weights: Vec<f64> = stock.iter().map(|qty| qty.to_f64().unwrap_or(0.0)).collect();
        let dist = WeightedIndex::new(&weights).map_err(|err| FillError::Allocation {
            abbreviation: abbreviation.clone(),
            reason: err.to_string(),
        })?;

        let split = DamageSplit::of(total);
        let mut per_day = vec![DamageSplit::default(); days.len()];
        for _ in 0..split.production {
            per_day[dist.sample(rng)].production += 1;
        }
        for _ in 0..split.packaging {
            per_day[dist.sample(rng)].packaging += 1;
        }

        allocation
            .by_abbreviation
            .insert(abbreviation.clone(), days.into_iter().zip(per_day).collect());
    }

    Ok(allocation)
}

/// Half-width of the expected-quantity perturbation for an actual quantity
pub fn perturbation_spread(actual: Decimal) -> i64 {
    if actual <= Decimal::from(50) {
        5
    } else if actual <= Decimal::from(200) {
        15
    } else {
        30
    }
}

/// An "expected" count close to the actual one.
///
/// Adds a uniform integer in `[-spread, spread]` and floors the result at
/// zero. Nothing is produced for a non-positive actual.
pub fn expected_quantity<R: Rng + ?Sized>(actual: Decimal, rng: &mut R) -> Option<Decimal> {
    if actual <= Decimal::ZERO {
        return None;
    }
    let spread = perturbation_spread(actual);
    let diff = rng.gen_range(-spread..=spread);
    Some((actual + Decimal::from(diff)).max(Decimal::ZERO))
}
