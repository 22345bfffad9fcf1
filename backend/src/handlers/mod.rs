//! HTTP handlers for the ledger API

pub mod health;
pub mod reporting;
pub mod stock;
