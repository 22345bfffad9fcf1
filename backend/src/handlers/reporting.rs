//! Stock report handlers

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::query::{normalize_level_filter, LevelListParams};
use crate::services::ReportingService;
use crate::AppState;

/// Report query: the level filter plus an optional output format
#[derive(Debug, Deserialize)]
pub struct ReportParams {
    #[serde(flatten)]
    pub filter: LevelListParams,
    /// `json` (default) or `csv`
    pub format: Option<String>,
}

impl ReportParams {
    fn wants_csv(&self) -> bool {
        self.format
            .as_deref()
            .map(|f| f.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
    }
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Stock-on-hand report
pub async fn stock_on_hand(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<ReportParams>,
) -> AppResult<Response> {
    let filter = normalize_level_filter(&params.filter)?;
    let rows = ReportingService::new(state.ledger.clone(), state.config.ledger.report_row_cap)
        .stock_on_hand(&filter)
        .await?;

    if params.wants_csv() {
        let csv = ReportingService::export_to_csv(&rows)?;
        return Ok(csv_response("soh_report.csv", csv));
    }
    Ok(Json(rows).into_response())
}

/// Levels at or below their minimum threshold
pub async fn low_stock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(params): Query<ReportParams>,
) -> AppResult<Response> {
    let filter = normalize_level_filter(&params.filter)?;
    let rows = ReportingService::new(state.ledger.clone(), state.config.ledger.report_row_cap)
        .low_stock(&filter)
        .await?;

    if params.wants_csv() {
        let csv = ReportingService::export_to_csv(&rows)?;
        return Ok(csv_response("low_stock_report.csv", csv));
    }
    Ok(Json(rows).into_response())
}
