//! Read-only report rows projected from stock levels and movements

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock-on-hand row for one product/warehouse pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SohReportRow {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: Option<i32>,
    pub last_updated: DateTime<Utc>,
}

impl SohReportRow {
    /// At or below the minimum threshold
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }
}

/// One supplier receipt, grouped from the movements a bulk submission wrote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockInBatch {
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub processed_date: DateTime<Utc>,
    pub processed_by: Option<Uuid>,
    pub item_count: i64,
    pub total_quantity: i64,
    pub total_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
