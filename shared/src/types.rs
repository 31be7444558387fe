//! Common types used across the stock filler

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single spreadsheet cell as seen by the domain layer.
///
/// The backend converts whatever the workbook reader produces into this
/// shape so that parsing and indexing never touch a spreadsheet library.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Spreadsheet "falsy" check: empty, blank text, zero or `false`.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(n) => *n == 0.0,
            CellValue::Bool(b) => !b,
            CellValue::DateTime(_) => false,
        }
    }

    /// No value at all. Unlike [`CellValue::is_blank`], zero is a value.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text the way a user would read it.
    ///
    /// Integral numbers drop the fractional part so that a numeric
    /// abbreviation cell such as `101` keys the same as the text `"101"`.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
        }
    }

    /// Interpret the cell as a quantity. Text is parsed, blank text is `None`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(n) => Decimal::from_f64(*n),
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => s.trim().parse::<Decimal>().ok(),
            CellValue::Bool(b) => Some(Decimal::from(u8::from(*b))),
            CellValue::Empty | CellValue::DateTime(_) => None,
        }
    }

    /// Template-side date interpretation.
    ///
    /// Only Excel serials and real date cells count; text (a header such as
    /// `DATE`) yields `None`.
    pub fn as_template_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Number(serial) => excel_serial_to_date(*serial),
            CellValue::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }
}

/// Columns of the fixed template layout (1-based, as Excel numbers them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateColumn {
    Date,
    FullName,
    Abbreviation,
    OpeningBalance,
    Expected,
    Actual,
    ProductionDamage,
    PackagingDamage,
    Sales,
}

impl TemplateColumn {
    pub fn index(&self) -> u32 {
        match self {
            TemplateColumn::Date => 1,
            TemplateColumn::FullName => 2,
            TemplateColumn::Abbreviation => 3,
            TemplateColumn::OpeningBalance => 4,
            TemplateColumn::Expected => 6,
            TemplateColumn::Actual => 7,
            TemplateColumn::ProductionDamage => 8,
            TemplateColumn::PackagingDamage => 10,
            TemplateColumn::Sales => 13,
        }
    }
}

/// Key used for every per-day aggregate: the calendar date and the template
/// abbreviation.
pub type DayKey = (NaiveDate, String);

fn excel_epoch() -> NaiveDate {
    // 1900 date system, with Excel's phantom 1900-02-29 absorbed by the offset
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Convert an Excel serial (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    excel_epoch().checked_add_days(Days::new(serial.floor() as u64))
}

/// Convert an Excel serial to a date-time, keeping the fractional day.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let date = excel_serial_to_date(serial)?;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as u32;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)?;
    Some(date.and_time(time))
}

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DAY_FIRST_DATE_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d",
];

/// Parse a report date, day-first.
///
/// `03/04/2024` is the 3rd of April. ISO dates are accepted as-is.
pub fn parse_day_first(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in DAY_FIRST_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    DAY_FIRST_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|dt| dt.date())
}

/// Report-side date interpretation: date cells, serials and day-first text.
pub fn report_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Number(serial) => excel_serial_to_date(*serial),
        CellValue::Text(raw) => parse_day_first(raw),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}
