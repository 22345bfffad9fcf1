//! Common types used across the ledger

use serde::{Deserialize, Serialize};

/// Default page size when the caller omits or mangles `limit`
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page size a caller may request
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Pagination parameters
///
/// Always normalized: `page >= 1` and `1 <= limit <= MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    /// Build a page request, falling back to defaults for out-of-range values
    pub fn normalized(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 && p <= i64::from(u32::MAX) => p as u32,
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l >= 1 && l <= i64::from(MAX_PAGE_LIMIT) => l as u32,
            _ => DEFAULT_PAGE_LIMIT,
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    /// Number of pages needed to show `total` items
    pub fn page_count(&self, total: i64) -> u32 {
        if total <= 0 {
            return 0;
        }
        let limit = i64::from(self.limit.max(1));
        ((total + limit - 1) / limit) as u32
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: PageRequest) -> Self {
        Self {
            data,
            total,
            page: page.page,
            limit: page.limit,
            pages: page.page_count(total),
        }
    }
}
