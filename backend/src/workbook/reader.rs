//! Workbook readers
//!
//! Templates are always xlsx. Reports may be xlsx (first sheet) or CSV.

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use shared::{excel_serial_to_datetime, CellValue, ReportTable, TemplateColumn, TemplateRow};

use super::{is_xlsx, WorkbookError};

/// Read the date, full name and abbreviation columns of the template sheet.
///
/// Every row of the used range is returned, the header included; the row
/// numbers are 1-based sheet rows.
pub fn read_template_rows(bytes: &[u8], sheet: &str) -> Result<Vec<TemplateRow>, WorkbookError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(WorkbookError::MissingSheet(sheet.to_string()));
    }
    let range = workbook.worksheet_range(sheet)?;
    Ok(template_rows(&range))
}

fn template_rows(range: &Range<Data>) -> Vec<TemplateRow> {
    let Some((last_row, _)) = range.end() else {
        return Vec::new();
    };
    let cell = |row: u32, column: TemplateColumn| {
        range
            .get_value((row, column.index() - 1))
            .map(cell_value)
            .unwrap_or_default()
    };

    (0..=last_row)
        .map(|row| TemplateRow {
            row: row + 1,
            date: cell(row, TemplateColumn::Date),
            full_name: cell(row, TemplateColumn::FullName),
            abbreviation: cell(row, TemplateColumn::Abbreviation),
        })
        .collect()
}

/// Read a report upload into a header-keyed table.
pub fn read_report_table(bytes: &[u8]) -> Result<ReportTable, WorkbookError> {
    if is_xlsx(bytes) {
        read_xlsx_report(bytes)
    } else {
        read_csv_report(bytes)
    }
}

fn read_xlsx_report(bytes: &[u8]) -> Result<ReportTable, WorkbookError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(WorkbookError::EmptyWorkbook)??;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|header| header.iter().map(|c| cell_value(c).as_text()).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_value).collect())
        .collect();

    Ok(ReportTable::new(headers, rows))
}

fn read_csv_report(bytes: &[u8]) -> Result<ReportTable, WorkbookError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(ReportTable::new(headers, rows))
}

/// Convert a calamine cell into the domain cell type
pub(crate) fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(v) => {
            let serial = v.as_f64();
            excel_serial_to_datetime(serial)
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Number(serial))
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}
