//! Pagination request and response types shared by every list endpoint.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Raw `?page=&per_page=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Normalized page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl From<PaginationQuery> for PageRequest {
    fn from(query: PaginationQuery) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            per_page: query
                .per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// Pagination block returned next to every list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_count: i64,
    pub next_link: Option<String>,
    pub prev_link: Option<String>,
}

impl Pagination {
    /// Build the pagination block.
    ///
    /// # Arguments
    ///
    /// * `request` - The page that was fetched
    /// * `total_count` - Number of rows matching the filters
    /// * `link_base` - Absolute URL of the list endpoint, without query string
    pub fn new(request: PageRequest, total_count: i64, link_base: &str) -> Self {
        let per_page = i64::from(request.per_page);
        let total_pages = u32::try_from((total_count.max(0) + per_page - 1) / per_page)
            .unwrap_or(u32::MAX);
        let page = request.page;

        let next_page = (page < total_pages).then_some(page + 1);
        let prev_page = (page > 1).then_some(page - 1);
        let link = |p: u32| format!("{link_base}?page={p}&per_page={}", request.per_page);

        Self {
            current_page: page,
            next_page,
            prev_page,
            per_page: request.per_page,
            total_pages,
            total_count,
            next_link: next_page.map(link),
            prev_link: prev_page.map(link),
        }
    }
}

/// A page of items plus its pagination block.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total_count: i64, request: PageRequest, link_base: &str) -> Self {
        Self {
            data,
            pagination: Pagination::new(request, total_count, link_base),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_and_clamps() {
        let req = PageRequest::from(PaginationQuery::default());
        assert_eq!(req, PageRequest { page: 1, per_page: 10 });

        let req = PageRequest::from(PaginationQuery {
            page: Some(0),
            per_page: Some(1000),
        });
        assert_eq!(req, PageRequest { page: 1, per_page: 100 });
    }

    #[test]
    fn middle_page_has_both_links() {
        let p = Pagination::new(PageRequest { page: 2, per_page: 10 }, 25, "http://x/accounts");
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.next_page, Some(3));
        assert_eq!(p.prev_page, Some(1));
        assert_eq!(p.next_link.as_deref(), Some("http://x/accounts?page=3&per_page=10"));
        assert_eq!(p.prev_link.as_deref(), Some("http://x/accounts?page=1&per_page=10"));
    }

    #[test]
    fn empty_listing_has_no_links() {
        let p = Pagination::new(PageRequest::default(), 0, "http://x/users");
        assert_eq!(p.total_pages, 0);
        assert!(p.next_link.is_none());
        assert!(p.prev_link.is_none());
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageRequest { page: 3, per_page: 20 }.offset(), 40);
    }
}
