//! HTTP handlers for stock movements and stock levels

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{
    BulkStockMovementRequest, CreateStockMovementRequest, PaginatedResponse, StockInBatch,
    StockLevel, StockMovement,
};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::query::{self, LevelListParams, MovementListParams, PageParams};
use crate::services::{ReportingService, StockService};
use crate::AppState;

fn stock_service(state: &AppState) -> StockService {
    StockService::new(state.ledger.clone(), state.config.ledger.clone())
}

fn reporting_service(state: &AppState) -> ReportingService {
    ReportingService::new(state.ledger.clone(), state.config.ledger.report_row_cap)
}

/// Record a single stock movement
pub async fn create_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateStockMovementRequest>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    let movement = stock_service(&state)
        .record_movement(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Record a supplier delivery as one batch
pub async fn create_bulk_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BulkStockMovementRequest>,
) -> AppResult<(StatusCode, Json<Vec<StockMovement>>)> {
    let movements = stock_service(&state)
        .record_bulk(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(movements)))
}

/// List the movement log
pub async fn list_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<MovementListParams>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    let query = query::normalize_movement_query(&params)?;
    let page = reporting_service(&state).list_movements(&query).await?;
    Ok(Json(page))
}

/// List supplier receipts grouped by batch
pub async fn list_stock_in_batches(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<PaginatedResponse<StockInBatch>>> {
    let page = query::normalize_page(&params.page, &params.limit);
    let batches = reporting_service(&state).list_stock_in_batches(page).await?;
    Ok(Json(batches))
}

/// List stock levels
pub async fn list_levels(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<LevelListParams>,
) -> AppResult<Json<PaginatedResponse<StockLevel>>> {
    let query = query::normalize_level_query(&params)?;
    let page = reporting_service(&state).list_levels(&query).await?;
    Ok(Json(page))
}

/// Get the level of one product in one warehouse
pub async fn get_level(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<StockLevel>> {
    let level = stock_service(&state)
        .get_level(product_id, warehouse_id)
        .await?;
    Ok(Json(level))
}
