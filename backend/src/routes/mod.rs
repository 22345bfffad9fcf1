//! Route definitions for the stock ledger API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health::health_check))
        // Protected routes - stock movements
        .nest("/stock-movements", movement_routes(state.clone()))
        // Protected routes - stock levels
        .nest("/stock-levels", level_routes(state.clone()))
        // Protected routes - reports
        .nest("/reports", report_routes(state))
}

fn movement_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::stock::create_movement).get(handlers::stock::list_movements),
        )
        .route("/bulk", post(handlers::stock::create_bulk_movements))
        .route("/stock-in", get(handlers::stock::list_stock_in_batches))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn level_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::stock::list_levels))
        .route(
            "/:product_id/:warehouse_id",
            get(handlers::stock::get_level),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn report_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/soh", get(handlers::reporting::stock_on_hand))
        .route("/low-stock", get(handlers::reporting::low_stock))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
