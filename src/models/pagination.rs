//! Pagination
//!
//! Page numbers come straight from the query string and are resolved
//! leniently: anything that is not an integer means page 1, anything out of
//! range means the last page, and an empty listing still has one page.

use serde::Serialize;

/// A resolved page of a listing with `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Current page number (1-indexed, always valid)
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl PageRequest {
    pub fn resolve(raw: Option<&str>, total: i64, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_pages(total, per_page);

        let page = match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
            None => 1,
            Some(n) if n < 1 || n > total_pages as i64 => total_pages,
            Some(n) => n as u32,
        };

        Self {
            page,
            per_page,
            total_pages,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

fn total_pages(total: i64, per_page: u32) -> u32 {
    let total = total.max(0) as u64;
    let per_page = per_page as u64;
    (total.div_ceil(per_page)).max(1) as u32
}

/// One page of items plus the navigation data templates need.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, request: &PageRequest) -> Self {
        let has_next = request.page < request.total_pages;
        let has_prev = request.page > 1;
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
            total_pages: request.total_pages,
            has_next,
            has_prev,
            next_page: has_next.then(|| request.page + 1),
            prev_page: has_prev.then(|| request.page - 1),
        }
    }

    /// A single empty page.
    pub fn empty(per_page: u32) -> Self {
        Self::new(Vec::new(), 0, &PageRequest::resolve(None, 0, per_page))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
            next_page: self.next_page,
            prev_page: self.prev_page,
        }
    }
}
