//! Offset pagination shared by every list endpoint.

use marketlens_api_types::PageMeta;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// A validated page window. Out-of-range inputs are clamped rather than rejected:
/// `limit` outside `1..=100` falls back to 20 and `page < 1` becomes 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(value) if value >= 1 => u32::try_from(value).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match limit {
            Some(value) if (1..=i64::from(MAX_LIMIT)).contains(&value) => value as u32,
            _ => DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of rows plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: PageRequest,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, page: PageRequest) -> Self {
        Self { items, total, page }
    }

    pub fn meta(&self) -> PageMeta {
        let limit = u64::from(self.page.limit());
        PageMeta {
            page: self.page.page(),
            limit: self.page.limit(),
            total: self.total,
            total_pages: self.total.div_ceil(limit),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_outside_bounds_falls_back_to_default() {
        assert_eq!(PageRequest::new(Some(1), Some(0)).limit(), 20);
        assert_eq!(PageRequest::new(Some(1), Some(101)).limit(), 20);
        assert_eq!(PageRequest::new(Some(1), Some(-5)).limit(), 20);
        assert_eq!(PageRequest::new(Some(1), Some(100)).limit(), 100);
        assert_eq!(PageRequest::new(Some(1), Some(1)).limit(), 1);
    }

    #[test]
    fn page_below_one_is_clamped() {
        assert_eq!(PageRequest::new(Some(0), None).page(), 1);
        assert_eq!(PageRequest::new(Some(-3), None).page(), 1);
        assert_eq!(PageRequest::new(None, None).page(), 1);
    }

    #[test]
    fn offset_and_meta() {
        let page = PageRequest::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);

        let paginated = Paginated::new(vec![1, 2, 3], 21, page);
        let meta = paginated.meta();
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.page, 3);
        assert_eq!(meta.limit, 10);
    }
}
