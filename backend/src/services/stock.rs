//! Stock movement processing
//!
//! Single and bulk submissions both reduce to an ordered list of movements
//! applied inside one unit of work: lock the level, validate, append the
//! movement, then create or overwrite the level. Nothing is visible until the
//! whole list commits.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use shared::{
    validation, BulkStockMovementRequest, CreateStockMovementRequest, LevelChange, MovementType,
    StockLevel, StockMovement, SUPPLIER_REFERENCE_TYPE,
};

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, NewStockLevel, NewStockMovement};

/// Records movements and keeps levels in step with them
#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl StockService {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Record one movement submitted by `user_id`
    pub async fn record_movement(
        &self,
        user_id: Uuid,
        input: CreateStockMovementRequest,
    ) -> AppResult<StockMovement> {
        input.validate()?;
        let movement_type: MovementType = input.movement_type.parse()?;
        validation::validate_quantity(input.quantity)?;
        validation::validate_cost_price(input.cost_price)?;
        if movement_type.sign().is_none() {
            return Err(validation::MovementError::UnsupportedMovementType(movement_type).into());
        }

        let movement = NewStockMovement {
            product_id: input.product_id,
            warehouse_id: input.warehouse_id,
            movement_type,
            quantity: input.quantity,
            cost_price: input.cost_price,
            total_amount: validation::total_amount(input.quantity, input.cost_price)?,
            reference_type: input.reference_type,
            reference_id: input.reference_id,
            reference_number: input.reference_number,
            reason: input.reason,
            user_id: Some(user_id),
            processed_by: Some(user_id),
            processed_date: Utc::now(),
        };

        let mut recorded = self
            .commit_movements("stock movement", std::slice::from_ref(&movement))
            .await?;
        recorded
            .pop()
            .ok_or_else(|| AppError::Internal("Movement was not recorded".to_string()))
    }

    /// Record a supplier delivery as one all-or-nothing batch of inbound lines
    pub async fn record_bulk(
        &self,
        user_id: Uuid,
        input: BulkStockMovementRequest,
    ) -> AppResult<Vec<StockMovement>> {
        input.validate()?;

        let processed_by = input.processed_by.unwrap_or(user_id);
        let processed_date = input.processed_date.unwrap_or_else(Utc::now);

        let mut movements = Vec::with_capacity(input.items.len());
        for (index, item) in input.items.into_iter().enumerate() {
            item.validate().map_err(|e| {
                let field = e.field_errors().keys().next().copied().unwrap_or("item");
                AppError::validation(&format!("items[{}].{}", index, field), e.to_string())
            })?;
            validation::validate_quantity(item.quantity).map_err(|e| {
                AppError::validation(&format!("items[{}].quantity", index), e.to_string())
            })?;
            let total_amount = validation::validate_cost_price(item.cost_price)
                .and_then(|_| validation::total_amount(item.quantity, item.cost_price))
                .map_err(|e| {
                    AppError::validation(&format!("items[{}].cost_price", index), e.to_string())
                })?;

            movements.push(NewStockMovement {
                product_id: item.product_id,
                warehouse_id: item.warehouse_id,
                movement_type: MovementType::In,
                quantity: item.quantity,
                cost_price: item.cost_price,
                total_amount,
                reference_type: Some(SUPPLIER_REFERENCE_TYPE.to_string()),
                reference_id: Some(input.supplier_id),
                reference_number: input.reference_number.clone(),
                reason: item.reason,
                user_id: Some(user_id),
                processed_by: Some(processed_by),
                processed_date,
            });
        }

        self.commit_movements("bulk stock movement", &movements).await
    }

    /// Current level for a pair
    pub async fn get_level(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<StockLevel> {
        self.store
            .get_level(product_id, warehouse_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock level".to_string()))
    }

    /// Apply `movements` in one unit of work, retrying on conflict and
    /// abandoning the unit when it outlives the configured timeout
    async fn commit_movements(
        &self,
        operation: &str,
        movements: &[NewStockMovement],
    ) -> AppResult<Vec<StockMovement>> {
        let mut retries_left = self.config.conflict_retries;

        loop {
            let attempt =
                tokio::time::timeout(self.config.unit_timeout(), self.apply_in_unit(movements))
                    .await
                    .unwrap_or_else(|_| Err(AppError::Timeout(operation.to_string())));

            match attempt {
                Ok(recorded) => {
                    tracing::info!(
                        operation,
                        lines = recorded.len(),
                        "Stock movements committed"
                    );
                    return Ok(recorded);
                }
                Err(err) if err.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    tracing::warn!(operation, error = %err, "Retrying after conflict");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_in_unit(&self, movements: &[NewStockMovement]) -> AppResult<Vec<StockMovement>> {
        let mut unit = self.store.begin().await?;
        let mut recorded = Vec::with_capacity(movements.len());

        // Take every row lock up front in key order so units sharing pairs
        // cannot wait on each other in a cycle
        if movements.len() > 1 {
            let pairs: BTreeSet<(Uuid, Uuid)> = movements
                .iter()
                .map(|m| (m.product_id, m.warehouse_id))
                .collect();
            for (product_id, warehouse_id) in pairs {
                unit.lock_level(product_id, warehouse_id).await?;
            }
        }

        for movement in movements {
            let current = unit
                .lock_level(movement.product_id, movement.warehouse_id)
                .await?;
            let change = validation::validate_movement(
                movement.movement_type,
                movement.quantity,
                current.as_ref(),
            )?;

            let stored = unit.append_movement(movement.clone()).await?;

            match change {
                LevelChange::Create { quantity } => {
                    unit.create_level(NewStockLevel {
                        product_id: movement.product_id,
                        warehouse_id: movement.warehouse_id,
                        quantity,
                        min_stock_level: self.config.default_min_stock_level,
                        max_stock_level: self.config.default_max_stock_level,
                    })
                    .await?;
                }
                LevelChange::Update { to, .. } => {
                    unit.set_level_quantity(movement.product_id, movement.warehouse_id, to)
                        .await?;
                }
            }

            recorded.push(stored);
        }

        unit.commit().await?;
        Ok(recorded)
    }
}
