//! Ledger Store: persistence for stock movements and stock levels
//!
//! Movements are append-only. Levels are the mutable projection keyed by
//! product and warehouse. Every write goes through a [`LedgerUnit`], which
//! is committed as a whole or rolled back when dropped.
//!
//! Two implementations exist: [`PgLedgerStore`] for production and
//! [`InMemoryLedgerStore`] for tests and local runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    LevelQuery, MovementQuery, MovementType, PageRequest, SohReportRow, StockInBatch, StockLevel,
    StockLevelFilter, StockMovement,
};
use uuid::Uuid;

use crate::error::AppResult;

mod memory;
mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// A movement ready to be appended; `total_amount` is already fixed
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockMovement {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub cost_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub reason: Option<String>,
    pub user_id: Option<Uuid>,
    pub processed_by: Option<Uuid>,
    pub processed_date: DateTime<Utc>,
}

/// Initial state of a lazily created level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockLevel {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: Option<i32>,
}

/// Which rows a stock-on-hand projection returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SohScope {
    All,
    /// Only levels at or below their minimum threshold
    LowStock,
}

/// Read side of the ledger plus the entry point for units of work
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work. Nothing it writes is visible until commit.
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnit>>;

    async fn get_level(&self, product_id: Uuid, warehouse_id: Uuid)
        -> AppResult<Option<StockLevel>>;

    async fn list_levels(&self, query: &LevelQuery) -> AppResult<(Vec<StockLevel>, i64)>;

    async fn list_movements(&self, query: &MovementQuery)
        -> AppResult<(Vec<StockMovement>, i64)>;

    /// Levels joined with product and warehouse metadata, at most `cap` rows
    async fn stock_on_hand(
        &self,
        filter: &StockLevelFilter,
        scope: SohScope,
        cap: i64,
    ) -> AppResult<Vec<SohReportRow>>;

    /// Supplier receipts grouped by reference, processed date and processor
    async fn list_stock_in_batches(&self, page: PageRequest)
        -> AppResult<(Vec<StockInBatch>, i64)>;

    /// Connectivity probe
    async fn ping(&self) -> AppResult<()>;
}

/// One atomic unit of ledger writes
///
/// Dropping a unit without calling [`LedgerUnit::commit`] discards its writes.
#[async_trait::async_trait]
pub trait LedgerUnit: Send {
    /// Read the level for a pair and hold it until the unit ends
    async fn lock_level(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<StockLevel>>;

    /// Fails with `Conflict` when the pair already has a level
    async fn create_level(&mut self, level: NewStockLevel) -> AppResult<StockLevel>;

    /// Unconditional overwrite of the pair's quantity
    async fn set_level_quantity(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
    ) -> AppResult<StockLevel>;

    async fn append_movement(&mut self, movement: NewStockMovement) -> AppResult<StockMovement>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Escape `%`, `_` and `\` so user input matches literally inside a LIKE pattern
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%term%` pattern for a case-insensitive substring filter
pub(crate) fn contains_pattern(term: &Option<String>) -> Option<String> {
    term.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{}%", escape_like(t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("beans"), "beans");
    }

    #[test]
    fn test_contains_pattern_skips_blank() {
        assert_eq!(contains_pattern(&None), None);
        assert_eq!(contains_pattern(&Some("  ".into())), None);
        assert_eq!(contains_pattern(&Some(" abc ".into())), Some("%abc%".into()));
    }
}
