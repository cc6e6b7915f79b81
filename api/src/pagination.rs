//! Offset pagination shared by every list endpoint.
//!
//! Handlers deserialize a [`PageQuery`], clamp it into a [`PageRequest`] and
//! hand that to the store. Stores answer with a [`Page`] carrying the total
//! row count so the client can render page controls.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Raw `?page=&limit=` query parameters (1-based page)
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Saturates for absurd page numbers; such a window is simply past the end
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl From<&PageQuery> for PageRequest {
    fn from(q: &PageQuery) -> Self {
        Self::new(q.page.unwrap_or(1), q.limit.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, req: PageRequest) -> Self {
        let has_more = req.offset().saturating_add(items.len() as i64) < total;
        Self {
            items,
            total,
            page: req.page,
            limit: req.limit,
            has_more,
        }
    }

    /// Slice an already-materialized, already-ordered list (in-memory store)
    pub fn from_vec(all: Vec<T>, req: PageRequest) -> Self {
        let total = all.len() as i64;
        let items = all
            .into_iter()
            .skip(usize::try_from(req.offset()).unwrap_or(usize::MAX))
            .take(req.limit as usize)
            .collect();
        Self::new(items, total, req)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(0, 10_000);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(3, 20);
        assert_eq!(req.offset(), 40);
    }

    #[test]
    fn test_page_from_vec() {
        let page = Page::from_vec((1..=5).collect::<Vec<i32>>(), PageRequest::new(2, 2));
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = Page::from_vec((1..=5).collect::<Vec<i32>>(), PageRequest::new(3, 2));
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_more);
    }

    #[test]
    fn test_huge_page_is_empty() {
        let req = PageRequest::new(i64::MAX, 2);
        assert_eq!(req.offset(), i64::MAX);

        let page = Page::from_vec(vec![1, 2, 3], req);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        assert!(!page.has_more);
    }
}
