//! Spreadsheet I/O: reading templates and reports, patching the template

use shared::FillError;
use thiserror::Error;

pub mod patch;
pub mod reader;
mod recalc;

pub use patch::{patch_template, CellPatches};
pub use reader::{read_report_table, read_template_rows};

/// Zip local file header; every xlsx package starts with it
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Errors raised while reading or writing workbook files
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read workbook: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("could not read csv report: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("template has no sheet named '{0}'")]
    MissingSheet(String),

    #[error("worksheet part not found in template: {0}")]
    MissingWorksheetPart(String),

    #[error("worksheet xml has no <sheetData> section: {0}")]
    MissingSheetData(String),

    #[error("workbook contains no sheets")]
    EmptyWorkbook,

    #[error(transparent)]
    Fill(#[from] FillError),
}

/// True when the upload is a zip package rather than delimited text
pub fn is_xlsx(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}
