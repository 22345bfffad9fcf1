//! Business logic services for the stock ledger

pub mod query;
pub mod reporting;
pub mod stock;

pub use reporting::ReportingService;
pub use stock::StockService;
