//! Error handling for the stock ledger server
//!
//! Every failure surfaces to callers as a JSON body with a stable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::MovementError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    InvalidPayload(#[from] validator::ValidationErrors),

    /// Rejections from the movement validator, passed through unchanged
    #[error(transparent)]
    Movement(#[from] MovementError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn conflict(resource: &str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Conflicts may succeed when the unit of work is repeated with a fresh read
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict { .. })
    }

    /// True when the movement validator rejected for lack of stock
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(
            self,
            AppError::Movement(MovementError::InsufficientStock { .. })
        )
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            retryable: false,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

fn movement_error_detail(err: &MovementError) -> (StatusCode, ErrorDetail) {
    let message = err.to_string();
    match err {
        MovementError::InvalidQuantity(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("INVALID_QUANTITY", message).with_field("quantity"),
        ),
        MovementError::InvalidMovementType(_) | MovementError::UnsupportedMovementType(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("INVALID_MOVEMENT_TYPE", message).with_field("movement_type"),
        ),
        MovementError::NegativeCostPrice
        | MovementError::CostPricePrecision
        | MovementError::CostPriceTooLarge
        | MovementError::TotalAmountTooLarge => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("VALIDATION_ERROR", message).with_field("cost_price"),
        ),
        MovementError::InsufficientStock { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new("INSUFFICIENT_STOCK", message).with_field("quantity"),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
            ),
            AppError::InvalidPayload(errors) => {
                let field = errors
                    .field_errors()
                    .keys()
                    .next()
                    .map(|f| f.to_string());
                let mut detail = ErrorDetail::new("VALIDATION_ERROR", errors.to_string());
                detail.field = field;
                (StatusCode::BAD_REQUEST, detail)
            }
            AppError::Movement(err) => movement_error_detail(err),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone())
                    .with_field(resource.clone())
                    .retryable(),
            ),
            AppError::Timeout(operation) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("TIMEOUT", format!("{} timed out", operation)).retryable(),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
