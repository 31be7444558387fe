//! HTTP handlers

pub mod health;
pub mod stock_fill;

pub use health::health_check;
pub use stock_fill::fill_stock_template;
