//! Domain models for the stock filler

mod damage;
mod fill;
mod movement;
mod report;
mod template;

pub use damage::*;
pub use fill::*;
pub use movement::*;
pub use report::ReportTable;
pub use template::*;
