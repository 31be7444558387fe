//! Shared types and reconciliation logic for the Stock Movement Filler
//!
//! This crate holds everything that does not touch a spreadsheet file: the
//! report models, template indexing, movement aggregation, damage allocation
//! and the resulting cell plan. The backend reads workbooks into
//! [`TemplateRow`]s and [`ReportTable`]s, calls [`build_fill_plan`], and
//! writes the returned [`CellWrite`]s back.

pub mod aggregate;
pub mod allocation;
pub mod error;
pub mod models;
pub mod plan;
pub mod types;
pub mod validation;

pub use aggregate::*;
pub use allocation::*;
pub use error::*;
pub use models::*;
pub use plan::*;
pub use types::*;
pub use validation::*;
