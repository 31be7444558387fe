//! Header-addressed report tables

use serde::{Deserialize, Serialize};

use crate::error::{FillError, FillResult, ReportKind};
use crate::types::CellValue;

/// A report sheet: one header row followed by data rows.
///
/// Column lookup is by header name, case-insensitive and trimmed, so
/// `Adjusted Amount` and `adjusted amount` address the same column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ReportTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { headers, rows }
    }

    /// Index of the named column, or a schema error naming the report.
    pub fn column(&self, report: ReportKind, name: &str) -> FillResult<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == wanted)
            .ok_or_else(|| FillError::MissingColumn {
                report,
                column: name.to_string(),
            })
    }

    /// Data rows with their 1-based sheet row number (the header is row 1).
    pub fn numbered_rows(&self) -> impl Iterator<Item = (usize, &[CellValue])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i + 2, row.as_slice()))
    }
}

/// Cell at `idx`, treating short rows as trailing empties.
pub(crate) fn cell_at(row: &[CellValue], idx: usize) -> &CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    row.get(idx).unwrap_or(&EMPTY)
}
