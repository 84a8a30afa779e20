//! Pagination for history queries.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: usize = 500;

/// 1-based page request. Built through [`PageRequest::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: usize,
    limit: usize,
}

impl PageRequest {
    /// Validate and build a page request.
    pub fn new(page: usize, limit: usize) -> Result<Self, CoreError> {
        if page == 0 {
            return Err(CoreError::InvalidPage("page is 1-based".to_string()));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(CoreError::InvalidPage(format!(
                "limit must be in 1..={MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of items to skip. A deserialized page 0 reads as page 1.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Slice an already-ordered list into this page.
    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit)
            .collect();
        Page {
            items,
            page: self.page,
            limit: self.limit,
            total,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    /// Total matching items across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.limit) < self.total
    }
}
