//! Shared fixtures for backend integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{BulkStockMovementItem, CreateStockMovementRequest};
use stock_ledger::config::{DatabaseConfig, JwtConfig, LedgerConfig, ServerConfig};
use stock_ledger::services::{ReportingService, StockService};
use stock_ledger::store::{InMemoryLedgerStore, LedgerStore};
use stock_ledger::{AppState, Config};

pub const JWT_SECRET: &str = "test-secret";

/// In-memory ledger with two products and two warehouses registered
pub struct Ledger {
    pub store: InMemoryLedgerStore,
    pub beans: Uuid,
    pub filters: Uuid,
    pub main: Uuid,
    pub annex: Uuid,
    pub user: Uuid,
}

impl Ledger {
    pub async fn new() -> Self {
        let store = InMemoryLedgerStore::new();
        let ledger = Self {
            store,
            beans: Uuid::new_v4(),
            filters: Uuid::new_v4(),
            main: Uuid::new_v4(),
            annex: Uuid::new_v4(),
            user: Uuid::new_v4(),
        };
        ledger
            .store
            .add_product(ledger.beans, "Arabica Beans", "ARB-001")
            .await;
        ledger
            .store
            .add_product(ledger.filters, "Paper Filters", "FLT-100")
            .await;
        ledger.store.add_warehouse(ledger.main, "Main Warehouse").await;
        ledger.store.add_warehouse(ledger.annex, "Annex").await;
        ledger
    }

    pub fn shared_store(&self) -> Arc<dyn LedgerStore> {
        Arc::new(self.store.clone())
    }

    pub fn stock_service(&self) -> StockService {
        StockService::new(self.shared_store(), LedgerConfig::default())
    }

    pub fn reporting_service(&self) -> ReportingService {
        ReportingService::new(self.shared_store(), LedgerConfig::default().report_row_cap)
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.shared_store(), test_config())
    }
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_secs: 1,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        ledger: LedgerConfig::default(),
    }
}

pub fn movement(
    product_id: Uuid,
    warehouse_id: Uuid,
    movement_type: &str,
    quantity: i32,
) -> CreateStockMovementRequest {
    CreateStockMovementRequest {
        product_id,
        warehouse_id,
        movement_type: movement_type.to_string(),
        quantity,
        cost_price: None,
        reference_type: None,
        reference_id: None,
        reference_number: None,
        reason: None,
    }
}

pub fn item(product_id: Uuid, warehouse_id: Uuid, quantity: i32, cost: Option<Decimal>) -> BulkStockMovementItem {
    BulkStockMovementItem {
        product_id,
        warehouse_id,
        quantity,
        cost_price: cost,
        reason: None,
    }
}
