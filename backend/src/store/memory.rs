//! In-memory ledger store
//!
//! Holds the whole ledger behind one async mutex. A unit of work owns the
//! lock for its lifetime and edits a private copy, which replaces the shared
//! state only on commit. Intended for tests and local runs.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use shared::{
    LevelQuery, LevelSortField, MovementQuery, MovementSortField, PageRequest, SohReportRow,
    SortOrder, StockInBatch, StockLevel, StockLevelFilter, StockMovement, StockMovementFilter,
    MovementType, SUPPLIER_REFERENCE_TYPE,
};

use super::{LedgerStore, LedgerUnit, NewStockLevel, NewStockMovement, SohScope};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
struct Product {
    name: String,
    sku: String,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    products: HashMap<Uuid, Product>,
    warehouses: HashMap<Uuid, String>,
    levels: HashMap<(Uuid, Uuid), StockLevel>,
    movements: Vec<StockMovement>,
}

impl LedgerState {
    /// Stand-in for the foreign keys on product and warehouse
    fn catalog(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<(&Product, &String)> {
        match (
            self.products.get(&product_id),
            self.warehouses.get(&warehouse_id),
        ) {
            (Some(product), Some(warehouse)) => Ok((product, warehouse)),
            _ => Err(AppError::validation(
                "product_id/warehouse_id",
                "Product or warehouse does not exist",
            )),
        }
    }

    fn soh_row(&self, level: &StockLevel) -> Option<SohReportRow> {
        let (product, warehouse) = self.catalog(level.product_id, level.warehouse_id).ok()?;
        Some(SohReportRow {
            product_id: level.product_id,
            product_name: product.name.clone(),
            product_sku: product.sku.clone(),
            warehouse_id: level.warehouse_id,
            warehouse_name: warehouse.clone(),
            quantity: level.quantity,
            reserved_quantity: level.reserved_quantity,
            available_quantity: level.available_quantity,
            min_stock_level: level.min_stock_level,
            max_stock_level: level.max_stock_level,
            last_updated: level.last_updated,
        })
    }
}

/// Ledger store kept entirely in process memory
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product so movements may reference it
    pub async fn add_product(&self, id: Uuid, name: &str, sku: &str) {
        self.state.lock().await.products.insert(
            id,
            Product {
                name: name.to_string(),
                sku: sku.to_string(),
            },
        );
    }

    /// Register a warehouse so movements may reference it
    pub async fn add_warehouse(&self, id: Uuid, name: &str) {
        self.state
            .lock()
            .await
            .warehouses
            .insert(id, name.to_string());
    }

    /// Set the thresholds of an existing level
    pub async fn set_thresholds(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        min_stock_level: i32,
        max_stock_level: Option<i32>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let level = state
            .levels
            .get_mut(&(product_id, warehouse_id))
            .ok_or_else(|| AppError::NotFound("Stock level".to_string()))?;
        level.min_stock_level = min_stock_level;
        level.max_stock_level = max_stock_level;
        Ok(())
    }
}

// ============================================================================
// Filtering and ordering, mirroring the SQL store
// ============================================================================

fn contains_ci(haystack: Option<&str>, needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        None => true,
        Some(needle) => haystack
            .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
    }
}

fn level_matches(level: &StockLevel, filter: &StockLevelFilter) -> bool {
    filter.product_id.map_or(true, |id| level.product_id == id)
        && filter.warehouse_id.map_or(true, |id| level.warehouse_id == id)
        && contains_ci(level.product_name.as_deref(), &filter.product_name)
        && contains_ci(level.product_sku.as_deref(), &filter.product_sku)
}

fn movement_matches(movement: &StockMovement, filter: &StockMovementFilter) -> bool {
    filter.product_id.map_or(true, |id| movement.product_id == id)
        && filter.warehouse_id.map_or(true, |id| movement.warehouse_id == id)
        && filter
            .movement_type
            .map_or(true, |t| movement.movement_type == t)
        && contains_ci(movement.product_name.as_deref(), &filter.product_name)
        && contains_ci(movement.product_sku.as_deref(), &filter.product_sku)
        && filter
            .processed_from()
            .map_or(true, |from| movement.processed_date >= from)
        && filter
            .processed_until()
            .map_or(true, |until| movement.processed_date < until)
}

fn compare_levels(a: &StockLevel, b: &StockLevel, field: LevelSortField) -> Ordering {
    match field {
        LevelSortField::ProductName => a.product_name.cmp(&b.product_name),
        LevelSortField::ProductSku => a.product_sku.cmp(&b.product_sku),
        LevelSortField::WarehouseName => a.warehouse_name.cmp(&b.warehouse_name),
        LevelSortField::Quantity => a.quantity.cmp(&b.quantity),
        LevelSortField::AvailableQuantity => a.available_quantity.cmp(&b.available_quantity),
        LevelSortField::LastUpdated => a.last_updated.cmp(&b.last_updated),
    }
}

fn compare_movements(a: &StockMovement, b: &StockMovement, field: MovementSortField) -> Ordering {
    match field {
        MovementSortField::ProcessedDate => a.processed_date.cmp(&b.processed_date),
        MovementSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        MovementSortField::Quantity => a.quantity.cmp(&b.quantity),
        MovementSortField::MovementType => a.movement_type.as_str().cmp(b.movement_type.as_str()),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let page_items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (page_items, total)
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnit>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryLedgerUnit { guard, working }))
    }

    async fn get_level(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<StockLevel>> {
        let state = self.state.lock().await;
        Ok(state.levels.get(&(product_id, warehouse_id)).cloned())
    }

    async fn list_levels(&self, query: &LevelQuery) -> AppResult<(Vec<StockLevel>, i64)> {
        let state = self.state.lock().await;
        let mut levels: Vec<StockLevel> = state
            .levels
            .values()
            .filter(|l| level_matches(l, &query.filter))
            .cloned()
            .collect();
        levels.sort_by(|a, b| {
            directed(compare_levels(a, b, query.sort), query.order).then(a.id.cmp(&b.id))
        });
        Ok(paginate(levels, query.page))
    }

    async fn list_movements(
        &self,
        query: &MovementQuery,
    ) -> AppResult<(Vec<StockMovement>, i64)> {
        let state = self.state.lock().await;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| movement_matches(m, &query.filter))
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal keys
        movements.sort_by(|a, b| directed(compare_movements(a, b, query.sort), query.order));
        Ok(paginate(movements, query.page))
    }

    async fn stock_on_hand(
        &self,
        filter: &StockLevelFilter,
        scope: SohScope,
        cap: i64,
    ) -> AppResult<Vec<SohReportRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<SohReportRow> = state
            .levels
            .values()
            .filter(|l| level_matches(l, filter))
            .filter_map(|l| state.soh_row(l))
            .filter(|r| scope == SohScope::All || r.is_low_stock())
            .collect();
        rows.sort_by(|a, b| {
            a.product_name
                .cmp(&b.product_name)
                .then_with(|| a.warehouse_name.cmp(&b.warehouse_name))
        });
        rows.truncate(cap.max(0) as usize);
        Ok(rows)
    }

    async fn list_stock_in_batches(
        &self,
        page: PageRequest,
    ) -> AppResult<(Vec<StockInBatch>, i64)> {
        let state = self.state.lock().await;
        let mut batches: Vec<StockInBatch> = Vec::new();

        let receipts = state.movements.iter().filter(|m| {
            m.movement_type == MovementType::In
                && m.reference_type.as_deref() == Some(SUPPLIER_REFERENCE_TYPE)
        });
        for movement in receipts {
            let existing = batches.iter_mut().find(|b| {
                b.reference_id == movement.reference_id
                    && b.reference_number == movement.reference_number
                    && b.processed_date == movement.processed_date
                    && b.processed_by == movement.processed_by
            });
            match existing {
                Some(batch) => {
                    batch.item_count += 1;
                    batch.total_quantity += i64::from(movement.quantity);
                    batch.total_amount = match (batch.total_amount, movement.total_amount) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                    batch.created_at = batch.created_at.min(movement.created_at);
                }
                None => batches.push(StockInBatch {
                    reference_id: movement.reference_id,
                    reference_number: movement.reference_number.clone(),
                    processed_date: movement.processed_date,
                    processed_by: movement.processed_by,
                    item_count: 1,
                    total_quantity: i64::from(movement.quantity),
                    total_amount: movement.total_amount,
                    created_at: movement.created_at,
                }),
            }
        }

        batches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.processed_date.cmp(&a.processed_date))
        });
        Ok(paginate(batches, page))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// Exclusive access to the ledger plus a working copy
pub struct InMemoryLedgerUnit {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerUnit for InMemoryLedgerUnit {
    async fn lock_level(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<StockLevel>> {
        Ok(self
            .working
            .levels
            .get(&(product_id, warehouse_id))
            .cloned())
    }

    async fn create_level(&mut self, level: NewStockLevel) -> AppResult<StockLevel> {
        let key = (level.product_id, level.warehouse_id);
        if self.working.levels.contains_key(&key) {
            return Err(AppError::conflict(
                "stock_level",
                "stock_level was created concurrently",
            ));
        }
        if level.quantity < 0 {
            return Err(AppError::conflict("stock_level", "stock_level changed concurrently"));
        }

        let (product, warehouse) = self
            .working
            .catalog(level.product_id, level.warehouse_id)?;
        let now = Utc::now();
        let created = StockLevel {
            id: Uuid::new_v4(),
            product_id: level.product_id,
            warehouse_id: level.warehouse_id,
            quantity: level.quantity,
            reserved_quantity: 0,
            available_quantity: level.quantity,
            min_stock_level: level.min_stock_level,
            max_stock_level: level.max_stock_level,
            last_updated: now,
            created_at: now,
            updated_at: now,
            product_name: Some(product.name.clone()),
            product_sku: Some(product.sku.clone()),
            warehouse_name: Some(warehouse.clone()),
        };
        self.working.levels.insert(key, created.clone());
        Ok(created)
    }

    async fn set_level_quantity(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
    ) -> AppResult<StockLevel> {
        if quantity < 0 {
            return Err(AppError::conflict("stock_level", "stock_level changed concurrently"));
        }
        let level = self
            .working
            .levels
            .get_mut(&(product_id, warehouse_id))
            .ok_or_else(|| AppError::NotFound("Stock level".to_string()))?;
        let now = Utc::now();
        level.quantity = quantity;
        level.available_quantity = quantity - level.reserved_quantity;
        level.last_updated = now;
        level.updated_at = now;
        Ok(level.clone())
    }

    async fn append_movement(&mut self, movement: NewStockMovement) -> AppResult<StockMovement> {
        let (product, warehouse) = self
            .working
            .catalog(movement.product_id, movement.warehouse_id)?;
        let stored = StockMovement {
            id: Uuid::new_v4(),
            product_id: movement.product_id,
            warehouse_id: movement.warehouse_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            cost_price: movement.cost_price,
            total_amount: movement.total_amount,
            reference_type: movement.reference_type,
            reference_id: movement.reference_id,
            reference_number: movement.reference_number,
            reason: movement.reason,
            user_id: movement.user_id,
            processed_by: movement.processed_by,
            processed_date: movement.processed_date,
            created_at: Utc::now(),
            product_name: Some(product.name.clone()),
            product_sku: Some(product.sku.clone()),
            warehouse_name: Some(warehouse.clone()),
        };
        self.working.movements.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryLedgerUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
