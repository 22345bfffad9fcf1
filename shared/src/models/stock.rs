//! Stock ledger models: movements, levels and their list vocabulary

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{PageRequest, SortOrder};
use crate::validation::MovementError;

/// Reference type stamped on every line of a supplier bulk receipt
pub const SUPPLIER_REFERENCE_TYPE: &str = "supplier";

/// Kind of stock movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stock_movement_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Transfer,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
        }
    }

    /// Multiplier applied to a movement's quantity when projecting it onto a level.
    ///
    /// `None` means the type has no single-ledger effect.
    pub fn sign(&self) -> Option<i32> {
        match self {
            MovementType::In | MovementType::Adjustment => Some(1),
            MovementType::Out => Some(-1),
            MovementType::Transfer => None,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = MovementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "transfer" => Ok(MovementType::Transfer),
            "adjustment" => Ok(MovementType::Adjustment),
            _ => Err(MovementError::InvalidMovementType(s.to_string())),
        }
    }
}

/// An immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; the effect sign comes from `movement_type`
    pub quantity: i32,
    pub cost_price: Option<Decimal>,
    /// `quantity * cost_price`, fixed at creation
    pub total_amount: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub reason: Option<String>,
    /// Submitting user; absent for system-originated batches
    pub user_id: Option<Uuid>,
    /// User of record for audit
    pub processed_by: Option<Uuid>,
    pub processed_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    // Joined fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_name: Option<String>,
}

impl StockMovement {
    /// Signed change this movement applies to its level
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type
            .sign()
            .map(|s| i64::from(s) * i64::from(self.quantity))
            .unwrap_or(0)
    }
}

/// Current on-hand projection for one product/warehouse pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockLevel {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub reserved_quantity: i32,
    /// `quantity - reserved_quantity`, maintained by the store
    pub available_quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: Option<i32>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Joined fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_name: Option<String>,
}

/// Input for submitting a single movement
///
/// `movement_type` stays a string here so unknown values reach the movement
/// validator and are reported as an invalid movement type.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStockMovementRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: String,
    pub quantity: i32,
    pub cost_price: Option<Decimal>,
    #[validate(length(max = 50, message = "Reference type must be at most 50 characters"))]
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    #[validate(length(max = 100, message = "Reference number must be at most 100 characters"))]
    pub reference_number: Option<String>,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Input for receiving one supplier delivery as a single batch
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkStockMovementRequest {
    pub supplier_id: Uuid,
    #[validate(length(max = 100, message = "Reference number must be at most 100 characters"))]
    pub reference_number: Option<String>,
    /// Defaults to the submitting user
    pub processed_by: Option<Uuid>,
    /// Defaults to the submission time
    pub processed_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<BulkStockMovementItem>,
}

/// One line of a bulk receipt
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkStockMovementItem {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: i32,
    pub cost_price: Option<Decimal>,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Filter vocabulary shared by level listings and reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    /// Case-insensitive substring of the product name
    pub product_name: Option<String>,
    /// Case-insensitive substring of the product SKU
    pub product_sku: Option<String>,
}

/// Filter vocabulary for the movement log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    /// Inclusive lower bound on `processed_date`
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `processed_date`
    pub date_to: Option<NaiveDate>,
}

impl StockMovementFilter {
    /// Inclusive lower bound on `processed_date` as an instant
    pub fn processed_from(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }

    /// Exclusive upper bound on `processed_date`: midnight after `date_to`
    pub fn processed_until(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }
}

/// Sortable columns for level listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSortField {
    #[default]
    ProductName,
    ProductSku,
    WarehouseName,
    Quantity,
    AvailableQuantity,
    LastUpdated,
}

impl LevelSortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product_name" => Some(Self::ProductName),
            "product_sku" | "sku" => Some(Self::ProductSku),
            "warehouse_name" => Some(Self::WarehouseName),
            "quantity" => Some(Self::Quantity),
            "available_quantity" => Some(Self::AvailableQuantity),
            "last_updated" => Some(Self::LastUpdated),
            _ => None,
        }
    }
}

/// Sortable columns for movement listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSortField {
    ProcessedDate,
    #[default]
    CreatedAt,
    Quantity,
    MovementType,
}

impl MovementSortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processed_date" => Some(Self::ProcessedDate),
            "created_at" => Some(Self::CreatedAt),
            "quantity" => Some(Self::Quantity),
            "movement_type" => Some(Self::MovementType),
            _ => None,
        }
    }
}

/// Normalized level listing request handed to the ledger store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelQuery {
    pub filter: StockLevelFilter,
    pub page: PageRequest,
    pub sort: LevelSortField,
    pub order: SortOrder,
}

/// Normalized movement listing request handed to the ledger store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementQuery {
    pub filter: StockMovementFilter,
    pub page: PageRequest,
    pub sort: MovementSortField,
    pub order: SortOrder,
}

impl Default for MovementQuery {
    fn default() -> Self {
        Self {
            filter: StockMovementFilter::default(),
            page: PageRequest::default(),
            sort: MovementSortField::default(),
            order: SortOrder::Desc,
        }
    }
}
