//! Query-string helpers shared by the list endpoints.

use serde::Serialize;

use crate::models::parse_leading_int;

/// Treats a missing or blank query parameter as absent.
pub fn filled(param: &Option<String>) -> Option<&str> {
    param.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `%term%` with LIKE metacharacters in `term` escaped.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Non-positive or unparseable values fall back to page 1 and
    /// `default_limit`.
    pub fn from_params(page: &Option<String>, limit: &Option<String>, default_limit: i64) -> Self {
        let parse = |raw: &Option<String>| {
            filled(raw)
                .and_then(parse_leading_int)
                .map(i64::from)
                .filter(|n| *n > 0)
        };

        Self {
            page: parse(page).unwrap_or(1),
            limit: parse(limit).unwrap_or(default_limit),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

/// A page of rows plus the counters every paged endpoint reports.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    #[serde(flatten)]
    pub items: T,
    pub total: i64,
    pub page: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: T, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            total_pages: pagination.total_pages(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn defaults_apply_to_missing_and_bad_values() {
        assert_eq!(
            Pagination::from_params(&None, &None, 50),
            Pagination { page: 1, limit: 50 }
        );
        assert_eq!(
            Pagination::from_params(&some("0"), &some("abc"), 20),
            Pagination { page: 1, limit: 20 }
        );
        assert_eq!(
            Pagination::from_params(&some("3"), &some("25"), 50),
            Pagination { page: 3, limit: 25 }
        );
    }

    #[test]
    fn offsets_and_page_counts() {
        let p = Pagination { page: 3, limit: 20 };
        assert_eq!(p.offset(), 40);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(20), 1);
        assert_eq!(p.total_pages(41), 3);
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(contains_pattern("ram"), "%ram%");
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn blank_params_are_absent() {
        assert_eq!(filled(&some("  ")), None);
        assert_eq!(filled(&some(" Male ")), Some("Male"));
        assert_eq!(filled(&None), None);
    }

    #[test]
    fn page_flattens_its_items() {
        #[derive(Serialize)]
        struct Logs {
            logs: Vec<u8>,
        }
        let json = serde_json::to_value(Page::new(
            Logs { logs: vec![1, 2] },
            2,
            Pagination { page: 1, limit: 50 },
        ))
        .unwrap();
        assert_eq!(json["logs"], serde_json::json!([1, 2]));
        assert_eq!(json["totalPages"], 1);
    }
}
