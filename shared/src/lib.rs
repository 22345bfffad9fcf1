//! Shared types and models for the stock ledger
//!
//! This crate contains the ledger's domain types, list/query vocabulary and the
//! pure movement validator. It performs no I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
