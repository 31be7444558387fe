//! Damages report records

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::report::{cell_at, ReportTable};
use crate::error::{FillError, FillResult, ReportKind};

const COL_GOOD_NAME: &str = "good name";
const COL_QUANTITY: &str = "quantity";

/// One row of the damages report. Quantities are whole units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub good_name: String,
    pub quantity: u64,
}

/// Parse the damages report. Rows without a quantity are dropped; fractional
/// quantities are truncated toward zero.
pub fn parse_damages(table: &ReportTable) -> FillResult<Vec<DamageRecord>> {
    let report = ReportKind::Damages;
    let name_col = table.column(report, COL_GOOD_NAME)?;
    let qty_col = table.column(report, COL_QUANTITY)?;

    let mut records = Vec::new();
    for (row_no, row) in table.numbered_rows() {
        let cell = cell_at(row, qty_col);
        if cell.is_missing() {
            continue;
        }
        let value = cell.as_decimal().ok_or_else(|| FillError::InvalidValue {
            report,
            row: row_no,
            column: COL_QUANTITY.to_string(),
            value: cell.as_text(),
        })?;
        if value < Decimal::ZERO {
            return Err(FillError::NegativeQuantity {
                report,
                row: row_no,
                value: value.to_string(),
            });
        }
        let quantity = value.trunc().to_u64().ok_or_else(|| FillError::InvalidValue {
            report,
            row: row_no,
            column: COL_QUANTITY.to_string(),
            value: value.to_string(),
        })?;

        records.push(DamageRecord {
            good_name: cell_at(row, name_col).as_text(),
            quantity,
        });
    }

    Ok(records)
}
