//! Stock movement report records

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::report::{cell_at, ReportTable};
use crate::error::{FillError, FillResult, ReportKind};
use crate::types::{report_date, CellValue};

pub const COL_DATE: &str = "date";
pub const COL_ABBREVIATIONS: &str = "abbreviations";
pub const COL_GOOD_NAME: &str = "good name";
pub const COL_MOVEMENT_TYPE: &str = "movement_type";
pub const COL_ADJUSTED_AMOUNT: &str = "adjusted amount";
pub const COL_BOOK_QUANTITY: &str = "book quantity";

/// Kind of stock transaction. Only stock-in and invoice issue feed the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods received (`Stock-in`)
    StockIn,
    /// Goods sold (`Invoice Issue`)
    InvoiceIssue,
    Other(String),
}

impl MovementType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Stock-in" => MovementType::StockIn,
            "Invoice Issue" => MovementType::InvoiceIssue,
            other => MovementType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MovementType::StockIn => "Stock-in",
            MovementType::InvoiceIssue => "Invoice Issue",
            MovementType::Other(s) => s,
        }
    }
}

/// One row of the movement report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub date: NaiveDate,
    /// Abbreviation as spelled in the report
    pub abbreviation: String,
    pub good_name: String,
    pub movement_type: MovementType,
    pub adjusted_amount: Decimal,
    pub book_quantity: Option<Decimal>,
}

impl MovementRecord {
    pub fn is_stock_in(&self) -> bool {
        self.movement_type == MovementType::StockIn
    }

    pub fn is_invoice_issue(&self) -> bool {
        self.movement_type == MovementType::InvoiceIssue
    }
}

struct MovementColumns {
    date: usize,
    abbreviation: usize,
    good_name: usize,
    movement_type: usize,
    adjusted_amount: usize,
    book_quantity: usize,
}

impl MovementColumns {
    fn locate(table: &ReportTable) -> FillResult<Self> {
        let report = ReportKind::Movement;
        Ok(Self {
            date: table.column(report, COL_DATE)?,
            abbreviation: table.column(report, COL_ABBREVIATIONS)?,
            good_name: table.column(report, COL_GOOD_NAME)?,
            movement_type: table.column(report, COL_MOVEMENT_TYPE)?,
            adjusted_amount: table.column(report, COL_ADJUSTED_AMOUNT)?,
            book_quantity: table.column(report, COL_BOOK_QUANTITY)?,
        })
    }
}

fn invalid(row: usize, column: &str, cell: &CellValue) -> FillError {
    FillError::InvalidValue {
        report: ReportKind::Movement,
        row,
        column: column.to_string(),
        value: cell.as_text(),
    }
}

fn quantity(row: usize, column: &str, cell: &CellValue) -> FillResult<Option<Decimal>> {
    if cell.is_missing() {
        return Ok(None);
    }
    cell.as_decimal()
        .map(Some)
        .ok_or_else(|| invalid(row, column, cell))
}

/// Parse every usable movement row.
///
/// Rows with no date or no abbreviation cannot be keyed and are skipped. A
/// non-empty date or quantity that does not parse fails the whole report.
pub fn parse_movements(table: &ReportTable) -> FillResult<Vec<MovementRecord>> {
    let cols = MovementColumns::locate(table)?;
    let mut records = Vec::with_capacity(table.rows.len());

    for (row_no, row) in table.numbered_rows() {
        let date_cell = cell_at(row, cols.date);
        let abbreviation = cell_at(row, cols.abbreviation).as_text().trim().to_string();
        if date_cell.is_blank() || abbreviation.is_empty() {
            tracing::debug!(row = row_no, "skipping movement row without date or abbreviation");
            continue;
        }
        let date = report_date(date_cell).ok_or_else(|| invalid(row_no, COL_DATE, date_cell))?;

        let adjusted_amount = quantity(
            row_no,
            COL_ADJUSTED_AMOUNT,
            cell_at(row, cols.adjusted_amount),
        )?
        .unwrap_or(Decimal::ZERO);
        let book_quantity = quantity(
            row_no,
            COL_BOOK_QUANTITY,
            cell_at(row, cols.book_quantity),
        )?;

        records.push(MovementRecord {
            date,
            abbreviation,
            good_name: cell_at(row, cols.good_name).as_text(),
            movement_type: MovementType::parse(&cell_at(row, cols.movement_type).as_text()),
            adjusted_amount,
            book_quantity,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        [
            "date",
            "abbreviations",
            "good name",
            "movement_type",
            "adjusted amount",
            "book quantity",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_movement_row() {
        let table = ReportTable::new(
            headers(),
            vec![vec![
                text("05/01/2024"),
                text("AB1"),
                text("Apple Box"),
                text("Stock-in"),
                CellValue::Number(300.0),
                CellValue::Number(12.0),
            ]],
        );
        let records = parse_movements(&table).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(record.is_stock_in());
        assert_eq!(record.adjusted_amount, Decimal::from(300));
        assert_eq!(record.book_quantity, Some(Decimal::from(12)));
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let table = ReportTable::new(headers(), vec![vec![CellValue::Empty; 6]]);
        assert!(parse_movements(&table).unwrap().is_empty());
    }

    #[test]
    fn test_bad_date_fails_with_row_number() {
        let table = ReportTable::new(
            headers(),
            vec![vec![
                text("not a date"),
                text("AB1"),
                text("Apple Box"),
                text("Stock-in"),
                CellValue::Number(1.0),
                CellValue::Number(1.0),
            ]],
        );
        let err = parse_movements(&table).unwrap_err();
        assert!(matches!(err, FillError::InvalidValue { row: 2, .. }));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let mut cols = headers();
        cols.retain(|c| c != "book quantity");
        let table = ReportTable::new(cols, vec![]);
        assert!(matches!(
            parse_movements(&table),
            Err(FillError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_movement_type_parsing() {
        assert_eq!(MovementType::parse("Stock-in"), MovementType::StockIn);
        assert_eq!(MovementType::parse(" Invoice Issue "), MovementType::InvoiceIssue);
        assert_eq!(
            MovementType::parse("Transfer"),
            MovementType::Other("Transfer".into())
        );
    }
}
