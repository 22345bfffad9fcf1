//! PostgreSQL ledger store
//!
//! Units of work are database transactions. The level row for a pair is read
//! with `FOR UPDATE`, so concurrent movements on the same pair serialize on
//! the row lock; `CHECK (quantity >= 0)` backs that up at commit. Units that
//! touch several pairs lock them in `(product_id, warehouse_id)` order.
//!
//! ## Error mapping
//!
//! | PostgreSQL code | Meaning | AppError |
//! |-----------------|---------|----------|
//! | `23505` | unique violation (racing level creation) | `Conflict` |
//! | `23514` | check violation (negative quantity) | `Conflict` |
//! | `23503` | foreign key violation | `Validation` |
//! | `40001` | serialization failure | `Conflict` |
//! | `40P01` | deadlock detected | `Conflict` |
//! | `55P03` | lock not available | `Conflict` |
//! | other | | `DatabaseError` |

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    LevelQuery, LevelSortField, MovementQuery, MovementSortField, PageRequest, SohReportRow,
    StockInBatch, StockLevel, StockLevelFilter, StockMovement, SUPPLIER_REFERENCE_TYPE,
};

use super::{contains_pattern, LedgerStore, LedgerUnit, NewStockLevel, NewStockMovement, SohScope};
use crate::error::{AppError, AppResult};

// ============================================================================
// SQL fragments
// ============================================================================

const LEVEL_COLUMNS: &str = r#"
    sl.id, sl.product_id, sl.warehouse_id, sl.quantity, sl.reserved_quantity,
    sl.available_quantity, sl.min_stock_level, sl.max_stock_level,
    sl.last_updated, sl.created_at, sl.updated_at,
    p.name AS product_name, p.sku AS product_sku, w.name AS warehouse_name
"#;

const MOVEMENT_COLUMNS: &str = r#"
    sm.id, sm.product_id, sm.warehouse_id, sm.movement_type, sm.quantity,
    sm.cost_price, sm.total_amount, sm.reference_type, sm.reference_id,
    sm.reference_number, sm.reason, sm.user_id, sm.processed_by,
    sm.processed_date, sm.created_at,
    p.name AS product_name, p.sku AS product_sku, w.name AS warehouse_name
"#;

/// Binds: $1 product_id, $2 warehouse_id, $3 name pattern, $4 sku pattern
const LEVEL_FILTER: &str = r#"
    ($1::uuid IS NULL OR sl.product_id = $1)
    AND ($2::uuid IS NULL OR sl.warehouse_id = $2)
    AND ($3::text IS NULL OR p.name ILIKE $3)
    AND ($4::text IS NULL OR p.sku ILIKE $4)
"#;

/// Binds: $1 product_id, $2 warehouse_id, $3 movement_type, $4 name pattern,
/// $5 sku pattern, $6 processed from (inclusive), $7 processed until (exclusive)
const MOVEMENT_FILTER: &str = r#"
    ($1::uuid IS NULL OR sm.product_id = $1)
    AND ($2::uuid IS NULL OR sm.warehouse_id = $2)
    AND ($3::stock_movement_type IS NULL OR sm.movement_type = $3)
    AND ($4::text IS NULL OR p.name ILIKE $4)
    AND ($5::text IS NULL OR p.sku ILIKE $5)
    AND ($6::timestamptz IS NULL OR sm.processed_date >= $6)
    AND ($7::timestamptz IS NULL OR sm.processed_date < $7)
"#;

fn level_sort_column(field: LevelSortField) -> &'static str {
    match field {
        LevelSortField::ProductName => "p.name",
        LevelSortField::ProductSku => "p.sku",
        LevelSortField::WarehouseName => "w.name",
        LevelSortField::Quantity => "sl.quantity",
        LevelSortField::AvailableQuantity => "sl.available_quantity",
        LevelSortField::LastUpdated => "sl.last_updated",
    }
}

fn movement_sort_column(field: MovementSortField) -> &'static str {
    match field {
        MovementSortField::ProcessedDate => "sm.processed_date",
        MovementSortField::CreatedAt => "sm.created_at",
        MovementSortField::Quantity => "sm.quantity",
        MovementSortField::MovementType => "sm.movement_type",
    }
}

/// Map a failure inside a unit of work onto the ledger's error vocabulary
fn map_unit_error(resource: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                return AppError::conflict(
                    resource,
                    format!("{} was created concurrently", resource),
                )
            }
            Some("23514") => {
                return AppError::conflict(
                    resource,
                    format!("{} changed concurrently", resource),
                )
            }
            Some("23503") => {
                return AppError::validation(
                    "product_id/warehouse_id",
                    "Product or warehouse does not exist",
                )
            }
            Some("40001" | "40P01" | "55P03") => {
                return AppError::conflict(
                    resource,
                    format!("{} is locked by a concurrent update", resource),
                )
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

// ============================================================================
// Store
// ============================================================================

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnit>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgLedgerUnit { tx }))
    }

    async fn get_level(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, StockLevel>(&format!(
            r#"
            SELECT {LEVEL_COLUMNS}
            FROM stock_levels sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            WHERE sl.product_id = $1 AND sl.warehouse_id = $2
            "#
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(level)
    }

    async fn list_levels(&self, query: &LevelQuery) -> AppResult<(Vec<StockLevel>, i64)> {
        let filter = &query.filter;
        let name = contains_pattern(&filter.product_name);
        let sku = contains_pattern(&filter.product_sku);

        let total = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT COUNT(*)
            FROM stock_levels sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            WHERE {LEVEL_FILTER}
            "#
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(&name)
        .bind(&sku)
        .fetch_one(&self.db)
        .await?;

        let levels = sqlx::query_as::<_, StockLevel>(&format!(
            r#"
            SELECT {LEVEL_COLUMNS}
            FROM stock_levels sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            WHERE {LEVEL_FILTER}
            ORDER BY {} {}, sl.id
            LIMIT $5 OFFSET $6
            "#,
            level_sort_column(query.sort),
            query.order.as_sql(),
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(&name)
        .bind(&sku)
        .bind(i64::from(query.page.limit))
        .bind(query.page.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((levels, total))
    }

    async fn list_movements(
        &self,
        query: &MovementQuery,
    ) -> AppResult<(Vec<StockMovement>, i64)> {
        let filter = &query.filter;
        let name = contains_pattern(&filter.product_name);
        let sku = contains_pattern(&filter.product_sku);
        let from = filter.processed_from();
        let until = filter.processed_until();

        let total = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT COUNT(*)
            FROM stock_movements sm
            JOIN products p ON p.id = sm.product_id
            JOIN warehouses w ON w.id = sm.warehouse_id
            WHERE {MOVEMENT_FILTER}
            "#
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.movement_type)
        .bind(&name)
        .bind(&sku)
        .bind(from)
        .bind(until)
        .fetch_one(&self.db)
        .await?;

        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements sm
            JOIN products p ON p.id = sm.product_id
            JOIN warehouses w ON w.id = sm.warehouse_id
            WHERE {MOVEMENT_FILTER}
            ORDER BY {} {}, sm.id
            LIMIT $8 OFFSET $9
            "#,
            movement_sort_column(query.sort),
            query.order.as_sql(),
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.movement_type)
        .bind(&name)
        .bind(&sku)
        .bind(from)
        .bind(until)
        .bind(i64::from(query.page.limit))
        .bind(query.page.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((movements, total))
    }

    async fn stock_on_hand(
        &self,
        filter: &StockLevelFilter,
        scope: SohScope,
        cap: i64,
    ) -> AppResult<Vec<SohReportRow>> {
        let rows = sqlx::query_as::<_, SohReportRow>(&format!(
            r#"
            SELECT
                sl.product_id, p.name AS product_name, p.sku AS product_sku,
                sl.warehouse_id, w.name AS warehouse_name,
                sl.quantity, sl.reserved_quantity, sl.available_quantity,
                sl.min_stock_level, sl.max_stock_level, sl.last_updated
            FROM stock_levels sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            WHERE {LEVEL_FILTER}
              AND (NOT $5 OR sl.quantity <= sl.min_stock_level)
            ORDER BY p.name, w.name, sl.id
            LIMIT $6
            "#
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(contains_pattern(&filter.product_name))
        .bind(contains_pattern(&filter.product_sku))
        .bind(scope == SohScope::LowStock)
        .bind(cap)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn list_stock_in_batches(
        &self,
        page: PageRequest,
    ) -> AppResult<(Vec<StockInBatch>, i64)> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM (
                SELECT 1
                FROM stock_movements
                WHERE reference_type = $1 AND movement_type = 'in'
                GROUP BY reference_id, reference_number, processed_date, processed_by
            ) batches
            "#,
        )
        .bind(SUPPLIER_REFERENCE_TYPE)
        .fetch_one(&self.db)
        .await?;

        let batches = sqlx::query_as::<_, StockInBatch>(
            r#"
            SELECT
                reference_id, reference_number, processed_date, processed_by,
                COUNT(*) AS item_count,
                SUM(quantity)::BIGINT AS total_quantity,
                SUM(total_amount) AS total_amount,
                MIN(created_at) AS created_at
            FROM stock_movements
            WHERE reference_type = $1 AND movement_type = 'in'
            GROUP BY reference_id, reference_number, processed_date, processed_by
            ORDER BY MIN(created_at) DESC, processed_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(SUPPLIER_REFERENCE_TYPE)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((batches, total))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// A transaction; dropping it before commit rolls back
pub struct PgLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn lock_level(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, StockLevel>(&format!(
            r#"
            SELECT {LEVEL_COLUMNS}
            FROM stock_levels sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            WHERE sl.product_id = $1 AND sl.warehouse_id = $2
            FOR UPDATE OF sl
            "#
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_unit_error("stock_level", e))?;

        Ok(level)
    }

    async fn create_level(&mut self, level: NewStockLevel) -> AppResult<StockLevel> {
        sqlx::query_as::<_, StockLevel>(&format!(
            r#"
            WITH sl AS (
                INSERT INTO stock_levels (
                    product_id, warehouse_id, quantity, reserved_quantity,
                    min_stock_level, max_stock_level, last_updated
                )
                VALUES ($1, $2, $3, 0, $4, $5, NOW())
                RETURNING *
            )
            SELECT {LEVEL_COLUMNS}
            FROM sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            "#
        ))
        .bind(level.product_id)
        .bind(level.warehouse_id)
        .bind(level.quantity)
        .bind(level.min_stock_level)
        .bind(level.max_stock_level)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unit_error("stock_level", e))
    }

    async fn set_level_quantity(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
    ) -> AppResult<StockLevel> {
        sqlx::query_as::<_, StockLevel>(&format!(
            r#"
            WITH sl AS (
                UPDATE stock_levels
                SET quantity = $3, last_updated = NOW(), updated_at = NOW()
                WHERE product_id = $1 AND warehouse_id = $2
                RETURNING *
            )
            SELECT {LEVEL_COLUMNS}
            FROM sl
            JOIN products p ON p.id = sl.product_id
            JOIN warehouses w ON w.id = sl.warehouse_id
            "#
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_unit_error("stock_level", e))?
        .ok_or_else(|| AppError::NotFound("Stock level".to_string()))
    }

    async fn append_movement(&mut self, movement: NewStockMovement) -> AppResult<StockMovement> {
        sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            WITH sm AS (
                INSERT INTO stock_movements (
                    product_id, warehouse_id, movement_type, quantity,
                    cost_price, total_amount, reference_type, reference_id,
                    reference_number, reason, user_id, processed_by, processed_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING *
            )
            SELECT {MOVEMENT_COLUMNS}
            FROM sm
            JOIN products p ON p.id = sm.product_id
            JOIN warehouses w ON w.id = sm.warehouse_id
            "#
        ))
        .bind(movement.product_id)
        .bind(movement.warehouse_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(movement.cost_price)
        .bind(movement.total_amount)
        .bind(&movement.reference_type)
        .bind(movement.reference_id)
        .bind(&movement.reference_number)
        .bind(&movement.reason)
        .bind(movement.user_id)
        .bind(movement.processed_by)
        .bind(movement.processed_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unit_error("stock_movement", e))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_unit_error("stock_level", e))
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct PgError {
        code: &'static str,
        message: &'static str,
    }

    impl DatabaseError for PgError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn pg_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::from(PgError {
            code,
            message: "simulated",
        })
    }

    #[test]
    fn test_lock_failures_become_retryable_conflicts() {
        for code in ["40001", "40P01", "55P03"] {
            let err = map_unit_error("stock_level", pg_error(code));
            assert!(matches!(err, AppError::Conflict { .. }), "{} -> {:?}", code, err);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_constraint_violations() {
        assert!(matches!(
            map_unit_error("stock_level", pg_error("23505")),
            AppError::Conflict { .. }
        ));
        assert!(matches!(
            map_unit_error("stock_level", pg_error("23514")),
            AppError::Conflict { .. }
        ));
        assert!(matches!(
            map_unit_error("stock_movement", pg_error("23503")),
            AppError::Validation { .. }
        ));
    }

    #[test]
    fn test_other_failures_stay_database_errors() {
        let err = map_unit_error("stock_level", pg_error("22003"));
        assert!(matches!(err, AppError::DatabaseError(_)));
        assert!(!err.is_retryable());

        let err = map_unit_error("stock_level", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
