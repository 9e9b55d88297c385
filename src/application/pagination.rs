//! Offset pagination shared by list endpoints.
//!
//! Query values are parsed leniently: the absolute value of a number is used and
//! anything that is missing, zero, or not numeric falls back to the default.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageParams {
    pub current_page: u64,
    pub page_size: u64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            current_page: DEFAULT_CURRENT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageParams {
    pub fn new(current_page: u64, page_size: u64) -> Self {
        Self {
            current_page: current_page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn parse(current_page: Option<&str>, page_size: Option<&str>) -> Self {
        Self {
            current_page: lenient_positive(current_page).unwrap_or(DEFAULT_CURRENT_PAGE),
            page_size: lenient_positive(page_size).unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.current_page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// Offset and limit as SQL bind values.
    pub fn sql_bounds(&self) -> (i64, i64) {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        (clamp(self.offset()), clamp(self.limit()))
    }

    pub fn pagination(&self, total: u64) -> Pagination {
        Pagination {
            total,
            current_page: self.current_page,
            page_size: self.page_size,
        }
    }
}

fn lenient_positive(raw: Option<&str>) -> Option<u64> {
    let value: f64 = raw?.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let whole = value.abs().trunc();
    (whole >= 1.0).then(|| whole.min(u64::MAX as f64) as u64)
}

/// Raw `currentPage`/`pageSize` query values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub current_page: Option<String>,
    pub page_size: Option<String>,
}

impl PageQuery {
    pub fn params(&self) -> PageParams {
        PageParams::parse(self.current_page.as_deref(), self.page_size.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub current_page: u64,
    pub page_size: u64,
}

/// One page of rows plus the unpaged row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_zero_and_garbage() {
        assert_eq!(PageParams::parse(None, None), PageParams::default());
        assert_eq!(PageParams::parse(Some("0"), Some("abc")), PageParams::default());
        assert_eq!(PageParams::parse(Some(""), Some("NaN")), PageParams::default());
    }

    #[test]
    fn negative_values_use_absolute_value() {
        let params = PageParams::parse(Some("-3"), Some("-20"));
        assert_eq!(params.current_page, 3);
        assert_eq!(params.page_size, 20);
        assert_eq!(params.offset(), 40);
    }

    #[test]
    fn fractions_truncate() {
        let params = PageParams::parse(Some("2.7"), Some("5"));
        assert_eq!(params.current_page, 2);
        assert_eq!(params.offset(), 5);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let json = serde_json::to_value(PageParams::new(2, 10).pagination(31)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"total": 31, "currentPage": 2, "pageSize": 10})
        );
    }
}
