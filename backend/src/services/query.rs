//! Query Gateway: turns raw listing parameters into normalized store queries
//!
//! Pagination and sorting never fail; out-of-range or unknown values fall back
//! to defaults. Malformed ids, dates and movement types are rejected.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use shared::{
    LevelQuery, LevelSortField, MovementQuery, MovementSortField, MovementType, PageRequest,
    SortOrder, StockLevelFilter, StockMovementFilter,
};

use crate::error::{AppError, AppResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw query string of a level listing or stock report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LevelListParams {
    pub product_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Raw query string of a movement listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementListParams {
    pub product_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub movement_type: Option<String>,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Raw pagination parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_uuid(field: &str, value: &Option<String>) -> AppResult<Option<Uuid>> {
    present(value)
        .map(|v| {
            Uuid::parse_str(v).map_err(|_| AppError::validation(field, format!("Invalid {}", field)))
        })
        .transpose()
}

fn parse_date(field: &str, value: &Option<String>) -> AppResult<Option<NaiveDate>> {
    present(value)
        .map(|v| {
            NaiveDate::parse_from_str(v, DATE_FORMAT).map_err(|_| {
                AppError::validation(field, format!("Invalid {}, expected YYYY-MM-DD", field))
            })
        })
        .transpose()
}

fn parse_movement_type(value: &Option<String>) -> AppResult<Option<MovementType>> {
    present(value)
        .map(|v| v.parse::<MovementType>().map_err(AppError::from))
        .transpose()
}

fn text(value: &Option<String>) -> Option<String> {
    present(value).map(str::to_string)
}

/// Normalize page and limit; unparsable or out-of-range values use defaults
pub fn normalize_page(page: &Option<String>, limit: &Option<String>) -> PageRequest {
    let number = |v: &Option<String>| present(v).and_then(|s| s.parse::<i64>().ok());
    PageRequest::normalized(number(page), number(limit))
}

fn normalize_order(value: &Option<String>, default: SortOrder) -> SortOrder {
    present(value).and_then(SortOrder::parse).unwrap_or(default)
}

/// Filter shared by level listings and stock reports
pub fn normalize_level_filter(params: &LevelListParams) -> AppResult<StockLevelFilter> {
    Ok(StockLevelFilter {
        product_id: parse_uuid("product_id", &params.product_id)?,
        warehouse_id: parse_uuid("warehouse_id", &params.warehouse_id)?,
        product_name: text(&params.product_name),
        product_sku: text(&params.product_sku),
    })
}

pub fn normalize_level_query(params: &LevelListParams) -> AppResult<LevelQuery> {
    Ok(LevelQuery {
        filter: normalize_level_filter(params)?,
        page: normalize_page(&params.page, &params.limit),
        sort: present(&params.sort_by)
            .and_then(LevelSortField::parse)
            .unwrap_or_default(),
        order: normalize_order(&params.sort_order, SortOrder::Asc),
    })
}

pub fn normalize_movement_query(params: &MovementListParams) -> AppResult<MovementQuery> {
    let filter = StockMovementFilter {
        product_id: parse_uuid("product_id", &params.product_id)?,
        warehouse_id: parse_uuid("warehouse_id", &params.warehouse_id)?,
        movement_type: parse_movement_type(&params.movement_type)?,
        product_name: text(&params.product_name),
        product_sku: text(&params.product_sku),
        date_from: parse_date("date_from", &params.date_from)?,
        date_to: parse_date("date_to", &params.date_to)?,
    };

    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(AppError::validation(
                "date_from",
                "date_from must not be after date_to",
            ));
        }
    }

    Ok(MovementQuery {
        filter,
        page: normalize_page(&params.page, &params.limit),
        sort: present(&params.sort_by)
            .and_then(MovementSortField::parse)
            .unwrap_or_default(),
        order: normalize_order(&params.sort_order, SortOrder::Desc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_page_falls_back_on_garbage() {
        assert_eq!(normalize_page(&some("abc"), &some("-1")), PageRequest::default());
        assert_eq!(normalize_page(&some("2"), &some("500")).limit, 10);
        assert_eq!(normalize_page(&some("2"), &some("50")), PageRequest { page: 2, limit: 50 });
    }

    #[test]
    fn test_unknown_sort_uses_default() {
        let params = LevelListParams {
            sort_by: some("drop table"),
            sort_order: some("sideways"),
            ..Default::default()
        };
        let query = normalize_level_query(&params).unwrap();
        assert_eq!(query.sort, LevelSortField::ProductName);
        assert_eq!(query.order, SortOrder::Asc);
    }

    #[test]
    fn test_malformed_uuid_rejected() {
        let params = LevelListParams {
            product_id: some("not-a-uuid"),
            ..Default::default()
        };
        let err = normalize_level_query(&params).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "product_id"));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let params = MovementListParams {
            product_id: some(""),
            movement_type: some("  "),
            product_name: some(" "),
            ..Default::default()
        };
        let query = normalize_movement_query(&params).unwrap();
        assert_eq!(query.filter, StockMovementFilter::default());
        assert_eq!(query.order, SortOrder::Desc);
    }

    #[test]
    fn test_movement_type_and_dates_parsed() {
        let params = MovementListParams {
            movement_type: some("OUT"),
            date_from: some("2024-01-01"),
            date_to: some("2024-01-31"),
            sort_by: some("processed_date"),
            sort_order: some("asc"),
            ..Default::default()
        };
        let query = normalize_movement_query(&params).unwrap();
        assert_eq!(query.filter.movement_type, Some(MovementType::Out));
        assert_eq!(query.filter.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(query.sort, MovementSortField::ProcessedDate);
        assert_eq!(query.order, SortOrder::Asc);
    }

    #[test]
    fn test_bad_movement_type_and_date_rejected() {
        let bad_type = MovementListParams {
            movement_type: some("sideways"),
            ..Default::default()
        };
        assert!(matches!(
            normalize_movement_query(&bad_type),
            Err(AppError::Movement(_))
        ));

        let bad_date = MovementListParams {
            date_to: some("31/01/2024"),
            ..Default::default()
        };
        assert!(matches!(
            normalize_movement_query(&bad_date),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let params = MovementListParams {
            date_from: some("2024-02-01"),
            date_to: some("2024-01-01"),
            ..Default::default()
        };
        assert!(normalize_movement_query(&params).is_err());
    }
}
