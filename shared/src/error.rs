//! Domain errors raised while turning reports into a fill plan
//!
//! Every variant aborts the whole run. Names that do not resolve and keys
//! missing from the template are not errors; they are counted in
//! [`crate::FillSummary`] instead.

use chrono::NaiveDate;
use thiserror::Error;

/// Which input a parse error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Movement,
    Damages,
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Movement => f.write_str("movement report"),
            ReportKind::Damages => f.write_str("damages report"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FillError {
    #[error("{report} is missing required column '{column}'")]
    MissingColumn { report: ReportKind, column: String },

    #[error("{report} row {row}: column '{column}' has an invalid value '{value}'")]
    InvalidValue {
        report: ReportKind,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{report} row {row}: quantity '{value}' is negative")]
    NegativeQuantity {
        report: ReportKind,
        row: usize,
        value: String,
    },

    #[error("stock-in for '{abbreviation}' on {date} is negative; damages cannot be weighted")]
    NegativeStockIn {
        abbreviation: String,
        date: NaiveDate,
    },

    #[error("damages for '{abbreviation}' exceed {limit} units")]
    TooManyDamageUnits { abbreviation: String, limit: u64 },

    #[error("damage allocation failed for '{abbreviation}': {reason}")]
    Allocation {
        abbreviation: String,
        reason: String,
    },
}

pub type FillResult<T> = Result<T, FillError>;
