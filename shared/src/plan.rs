//! From parsed inputs to the list of template cells to write

use rand::Rng;
use rust_decimal::Decimal;

use crate::aggregate::{aggregate_movements, damage_totals, AbbreviationMap, MovementTotals};
use crate::allocation::{allocate_damages, expected_quantity, DamageAllocation};
use crate::error::FillResult;
use crate::models::{
    parse_damages, parse_movements, FillPlan, ReportTable, TemplateIndex, TemplateRow,
};
use crate::types::TemplateColumn;

/// Behaviour switches for one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Write the perturbed "expected" column next to each actual quantity
    pub fill_expected: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            fill_expected: true,
        }
    }
}

/// Run the mapping, aggregation, allocation and write-back planning stages.
///
/// Fails on malformed reports or impossible weights. Names and keys that do
/// not line up with the template are dropped and counted in the summary.
pub fn build_fill_plan<R: Rng + ?Sized>(
    template: &[TemplateRow],
    movement_report: &ReportTable,
    damages_report: &ReportTable,
    options: PlanOptions,
    rng: &mut R,
) -> FillResult<FillPlan> {
    let movements = parse_movements(movement_report)?;
    let damages = parse_damages(damages_report)?;

    let index = TemplateIndex::from_rows(template);
    let abbreviations = AbbreviationMap::from_movements(&movements, index.products());
    let damages_by_abbreviation = damage_totals(&damages, index.products())?;
    tracing::debug!(
        products = index.products().len(),
        remapped_abbreviations = abbreviations.len(),
        "template products indexed"
    );
    let totals = aggregate_movements(&movements, &abbreviations);
    let allocation = allocate_damages(&damages_by_abbreviation.by_abbreviation, &totals, rng)?;

    let mut plan = FillPlan::default();
    plan.summary.template_keys = index.key_count();
    plan.summary.movement_rows = movements.len();
    plan.summary.damage_rows = damages.len();
    plan.summary.unmatched_damage_names = damages_by_abbreviation.unmatched;
    plan.summary.damages_without_stock_in = allocation.skipped.len();

    plan_openings(&mut plan, &index, &totals);
    plan_stock_in(&mut plan, &index, &totals, &allocation, options, rng);
    plan_sales(&mut plan, &index, &totals);

    Ok(plan)
}

fn plan_openings(plan: &mut FillPlan, index: &TemplateIndex, totals: &MovementTotals) {
    let Some(first_date) = index.first_date() else {
        plan.summary.skipped_openings = totals.openings.len();
        return;
    };
    for (abbreviation, balance) in &totals.openings {
        match index.row_for(first_date, abbreviation) {
            Some(row) => {
                plan.push(row, TemplateColumn::OpeningBalance, *balance);
                plan.summary.openings_written += 1;
            }
            None => {
                tracing::debug!(%abbreviation, %first_date, "no template row for opening balance");
                plan.summary.skipped_openings += 1;
            }
        }
    }
}

fn plan_stock_in<R: Rng + ?Sized>(
    plan: &mut FillPlan,
    index: &TemplateIndex,
    totals: &MovementTotals,
    allocation: &DamageAllocation,
    options: PlanOptions,
    rng: &mut R,
) {
    for ((date, abbreviation), stock_in) in &totals.stock_in {
        let Some(row) = index.row_for(*date, abbreviation) else {
            tracing::debug!(%abbreviation, %date, "no template row for stock-in");
            plan.summary.skipped_stock_in_keys += 1;
            continue;
        };

        let damages = allocation.for_day(abbreviation, *date);
        let actual = *stock_in + Decimal::from(damages.total());

        plan.push(row, TemplateColumn::Actual, actual);
        plan.push(row, TemplateColumn::ProductionDamage, Decimal::from(damages.production));
        plan.push(row, TemplateColumn::PackagingDamage, Decimal::from(damages.packaging));
        plan.summary.actual_rows_written += 1;
        plan.summary.damage_units_allocated += damages.total();

        if options.fill_expected {
            if let Some(expected) = expected_quantity(actual, rng) {
                plan.push(row, TemplateColumn::Expected, expected);
            }
        }
    }
}

fn plan_sales(plan: &mut FillPlan, index: &TemplateIndex, totals: &MovementTotals) {
    for ((date, abbreviation), sales) in &totals.sales {
        match index.row_for(*date, abbreviation) {
            Some(row) => {
                plan.push(row, TemplateColumn::Sales, *sales);
                plan.summary.sales_rows_written += 1;
            }
            None => {
                tracing::debug!(%abbreviation, %date, "no template row for sales");
                plan.summary.skipped_sales_keys += 1;
            }
        }
    }
}
