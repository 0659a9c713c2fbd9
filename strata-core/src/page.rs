use serde::{Deserialize, Serialize};

/// Default page size of the SQL backends.
pub const SQL_PAGE_SIZE: u64 = 20;
/// Default page size of the document store and search index backends.
pub const DOCUMENT_PAGE_SIZE: u64 = 10;

/// Largest offset or limit handed to a backend; SQL engines reject
/// anything past a signed 64-bit integer.
pub const MAX_ROWS: u64 = i64::MAX as u64;

/// Normalized paging: 1-based page and a non-zero size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: u64,
    pub size: u64,
}

impl Paging {
    /// Page `0` becomes `1`; size `0` becomes `default_size`.
    pub fn new(page: u64, size: u64, default_size: u64) -> Self {
        Self {
            page: page.max(1),
            size: if size == 0 { default_size.max(1) } else { size },
        }
    }

    /// Paging for a query where only some of page/size were set, or `None`
    /// when neither was.
    pub fn from_parts(page: Option<u64>, size: Option<u64>, default_size: u64) -> Option<Self> {
        if page.is_none() && size.is_none() {
            return None;
        }
        Some(Self::new(page.unwrap_or(1), size.unwrap_or(0), default_size))
    }

    /// Rows skipped before this page, saturating at [`MAX_ROWS`].
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.size).min(MAX_ROWS)
    }

    pub fn limit(&self) -> u64 {
        self.size.min(MAX_ROWS)
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, paging: Paging, total_elements: u64) -> Self {
        Self {
            content,
            page: paging.page,
            size: paging.size,
            total_elements,
            total_pages: total_elements.div_ceil(paging.size),
        }
    }
}
