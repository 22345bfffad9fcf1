//! Movement validation for the stock ledger
//!
//! Decides, from a movement's type, its quantity and the level row read by the
//! caller, whether the movement may be recorded and what it does to the level.
//! Nothing here touches storage.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{MovementType, StockLevel, StockMovement};

/// Reasons a proposed movement is rejected before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementError {
    #[error("Quantity must be a positive integer, got {0}")]
    InvalidQuantity(i64),

    #[error("Unknown movement type '{0}', expected one of in, out, transfer, adjustment")]
    InvalidMovementType(String),

    #[error("Movement type '{0}' has no single-warehouse effect and cannot be submitted")]
    UnsupportedMovementType(MovementType),

    #[error("Insufficient stock: requested {requested}, on hand {on_hand}")]
    InsufficientStock { requested: i32, on_hand: i32 },

    #[error("Cost price cannot be negative")]
    NegativeCostPrice,

    #[error("Cost price must have at most {} decimal places", MAX_COST_SCALE)]
    CostPricePrecision,

    #[error("Cost price cannot exceed {}", MAX_COST_PRICE)]
    CostPriceTooLarge,

    #[error("Line total cannot exceed {}", MAX_TOTAL_AMOUNT)]
    TotalAmountTooLarge,
}

/// Decimal places a stored cost price keeps
pub const MAX_COST_SCALE: u32 = 2;

/// Largest value a `NUMERIC(15, 2)` cost price column holds
pub const MAX_COST_PRICE: Decimal = Decimal::from_parts(2_764_472_319, 232_830, 0, false, 2);

/// Largest value a `NUMERIC(18, 2)` total amount column holds
pub const MAX_TOTAL_AMOUNT: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 2);

/// What an accepted movement does to the level of its product/warehouse pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    /// No level exists yet; create one holding `quantity`
    Create { quantity: i32 },
    /// Overwrite the existing level's quantity
    Update { from: i32, to: i32 },
}

impl LevelChange {
    pub fn new_quantity(&self) -> i32 {
        match self {
            LevelChange::Create { quantity } => *quantity,
            LevelChange::Update { to, .. } => *to,
        }
    }
}

/// Validate that a quantity is a positive integer
pub fn validate_quantity(quantity: i32) -> Result<(), MovementError> {
    if quantity <= 0 {
        return Err(MovementError::InvalidQuantity(i64::from(quantity)));
    }
    Ok(())
}

/// Validate an optional cost price: non-negative, cents precision, and within
/// what the ledger stores
pub fn validate_cost_price(cost_price: Option<Decimal>) -> Result<(), MovementError> {
    let Some(price) = cost_price else {
        return Ok(());
    };
    if price < Decimal::ZERO {
        return Err(MovementError::NegativeCostPrice);
    }
    if price.normalize().scale() > MAX_COST_SCALE {
        return Err(MovementError::CostPricePrecision);
    }
    if price > MAX_COST_PRICE {
        return Err(MovementError::CostPriceTooLarge);
    }
    Ok(())
}

/// Total value of a movement line, computed once when the line is recorded.
///
/// Expects a cost price that already passed [`validate_cost_price`].
pub fn total_amount(quantity: i32, cost_price: Option<Decimal>) -> Result<Option<Decimal>, MovementError> {
    let Some(price) = cost_price else {
        return Ok(None);
    };
    let total = price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| *total <= MAX_TOTAL_AMOUNT)
        .ok_or(MovementError::TotalAmountTooLarge)?;
    Ok(Some(total))
}

/// Check a movement against the current level and decide the level change.
///
/// `current` is the level row for the movement's pair as read inside the
/// caller's unit of work, or `None` when the pair has no row yet.
pub fn validate_movement(
    movement_type: MovementType,
    quantity: i32,
    current: Option<&StockLevel>,
) -> Result<LevelChange, MovementError> {
    validate_quantity(quantity)?;

    match movement_type {
        MovementType::In | MovementType::Adjustment => match current {
            None => Ok(LevelChange::Create { quantity }),
            Some(level) => {
                let to = level
                    .quantity
                    .checked_add(quantity)
                    .ok_or(MovementError::InvalidQuantity(i64::from(quantity)))?;
                Ok(LevelChange::Update {
                    from: level.quantity,
                    to,
                })
            }
        },
        MovementType::Out => match current {
            Some(level) if level.quantity >= quantity => Ok(LevelChange::Update {
                from: level.quantity,
                to: level.quantity - quantity,
            }),
            Some(level) => Err(MovementError::InsufficientStock {
                requested: quantity,
                on_hand: level.quantity,
            }),
            None => Err(MovementError::InsufficientStock {
                requested: quantity,
                on_hand: 0,
            }),
        },
        MovementType::Transfer => Err(MovementError::UnsupportedMovementType(movement_type)),
    }
}

/// Rebuild a level quantity from its movement log
pub fn replay_quantity<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> i64 {
    movements.into_iter().map(StockMovement::signed_quantity).sum()
}
