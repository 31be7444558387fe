//! Business logic services for the Stock Movement Filler

pub mod stock_fill;

pub use stock_fill::StockFillService;
