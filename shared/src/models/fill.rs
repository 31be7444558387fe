//! Fill plan: the cells one run writes, and what it skipped

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::TemplateColumn;
use crate::validation::{output_file_name, validate_output_name, DEFAULT_OUTPUT_NAME};

/// One numeric cell to set on the template sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWrite {
    /// 1-based sheet row
    pub row: u32,
    pub column: TemplateColumn,
    pub value: Decimal,
}

impl CellWrite {
    pub fn new(row: u32, column: TemplateColumn, value: Decimal) -> Self {
        Self { row, column, value }
    }
}

/// Counters for one run.
///
/// The `skipped_*` and `unmatched_*` fields count inputs that were dropped
/// without failing the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSummary {
    pub template_keys: usize,
    pub movement_rows: usize,
    pub damage_rows: usize,
    pub openings_written: usize,
    pub actual_rows_written: usize,
    pub sales_rows_written: usize,
    pub damage_units_allocated: u64,
    pub unmatched_damage_names: usize,
    pub skipped_openings: usize,
    pub skipped_stock_in_keys: usize,
    pub skipped_sales_keys: usize,
    /// Damaged items with no stock-in to spread their damages over
    pub damages_without_stock_in: usize,
}

/// Ordered cell writes plus the run summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillPlan {
    pub writes: Vec<CellWrite>,
    pub summary: FillSummary,
}

impl FillPlan {
    pub fn push(&mut self, row: u32, column: TemplateColumn, value: Decimal) {
        self.writes.push(CellWrite::new(row, column, value));
    }

    /// Last value planned for a cell, if any
    pub fn value_at(&self, row: u32, column: TemplateColumn) -> Option<Decimal> {
        self.writes
            .iter()
            .rev()
            .find(|w| w.row == row && w.column == column)
            .map(|w| w.value)
    }
}

/// Caller-supplied options for one fill request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FillRequest {
    #[validate(
        length(max = 120, message = "Output name must be at most 120 characters"),
        custom = "validate_output_name"
    )]
    pub output_name: String,

    /// Fixes the random draws so the same inputs give the same workbook
    pub seed: Option<u64>,
}

impl Default for FillRequest {
    fn default() -> Self {
        Self {
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            seed: None,
        }
    }
}

impl FillRequest {
    pub fn file_name(&self) -> String {
        output_file_name(&self.output_name)
    }
}
