//! Reporting Projector: read-only stock views

use std::sync::Arc;

use serde::Serialize;

use shared::{
    LevelQuery, MovementQuery, PageRequest, PaginatedResponse, SohReportRow, StockInBatch,
    StockLevel, StockLevelFilter, StockMovement,
};

use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, SohScope};

/// Serves stock-on-hand reports and paginated listings
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn LedgerStore>,
    row_cap: i64,
}

impl ReportingService {
    pub fn new(store: Arc<dyn LedgerStore>, row_cap: i64) -> Self {
        Self { store, row_cap }
    }

    /// Stock on hand for every level matching `filter`, up to the row cap
    pub async fn stock_on_hand(&self, filter: &StockLevelFilter) -> AppResult<Vec<SohReportRow>> {
        self.store
            .stock_on_hand(filter, SohScope::All, self.row_cap)
            .await
    }

    /// Levels at or below their minimum threshold
    pub async fn low_stock(&self, filter: &StockLevelFilter) -> AppResult<Vec<SohReportRow>> {
        self.store
            .stock_on_hand(filter, SohScope::LowStock, self.row_cap)
            .await
    }

    pub async fn list_levels(&self, query: &LevelQuery) -> AppResult<PaginatedResponse<StockLevel>> {
        let (levels, total) = self.store.list_levels(query).await?;
        Ok(PaginatedResponse::new(levels, total, query.page))
    }

    pub async fn list_movements(
        &self,
        query: &MovementQuery,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let (movements, total) = self.store.list_movements(query).await?;
        Ok(PaginatedResponse::new(movements, total, query.page))
    }

    pub async fn list_stock_in_batches(
        &self,
        page: PageRequest,
    ) -> AppResult<PaginatedResponse<StockInBatch>> {
        let (batches, total) = self.store.list_stock_in_batches(page).await?;
        Ok(PaginatedResponse::new(batches, total, page))
    }

    /// Export report rows as CSV
    pub fn export_to_csv<T: Serialize>(rows: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for row in rows {
            wtr.serialize(row)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}
