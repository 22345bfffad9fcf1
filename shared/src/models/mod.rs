//! Domain models for the stock ledger

mod report;
mod stock;

pub use report::*;
pub use stock::*;
