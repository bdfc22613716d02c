//! Pagination settings and paginated results

use serde::Serialize;

/// Page settings remembered by `paginate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    pub fn limit(&self) -> usize {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }
}

/// One page of results with its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub last_page: usize,
    pub has_more_pages: bool,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: usize, pagination: Pagination) -> Self {
        let last_page = if pagination.per_page == 0 {
            1
        } else {
            total.div_ceil(pagination.per_page).max(1)
        };

        Self {
            data,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            last_page,
            has_more_pages: pagination.page < last_page,
        }
    }
}
