//! Listing page requests and the embedded result-list state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fetch tier a page request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Http,
    Browser,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single listing page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    /// 1-based page number.
    pub page: u32,
    pub tier: Tier,
}

impl PageRequest {
    pub fn new(url: impl Into<String>, page: u32, tier: Tier) -> Self {
        Self {
            url: url.into(),
            page: page.max(1),
            tier,
        }
    }

    /// Same page, routed to the browser tier.
    pub fn escalate(&self) -> Self {
        Self {
            url: self.url.clone(),
            page: self.page,
            tier: Tier::Browser,
        }
    }
}

/// Pagination descriptor carried by a listing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub page_count: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            page_count: 0,
        }
    }
}

/// Parsed `app-unifiedResultlist` document.
///
/// The document is kept opaque; only the entry list and the pagination
/// descriptor are read. Both are looked up under `searchResults` first and
/// then at the top level.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingState {
    document: Value,
}

impl ListingState {
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn section(&self, key: &str) -> Option<&Value> {
        self.document
            .get("searchResults")
            .and_then(|r| r.get(key))
            .or_else(|| self.document.get(key))
    }

    /// Ordered raw entries.
    pub fn items(&self) -> &[Value] {
        self.section("items")
            .and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[])
    }

    /// Pagination with `currentPage` defaulting to 1 and `pageCount` to 0.
    pub fn pagination(&self) -> Pagination {
        let Some(p) = self.section("pagination") else {
            return Pagination::default();
        };

        let current_page = read_u32(p, &["currentPage", "page"]).unwrap_or(1);
        let page_count = read_u32(p, &["pageCount", "totalPages"]).unwrap_or(0);

        Pagination {
            current_page,
            page_count,
        }
    }
}

/// Read the first key that holds a non-negative integer (or a numeric string).
fn read_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_items_and_pagination_under_search_results() {
        let state = ListingState::new(json!({
            "searchResults": {
                "items": [{"title": "a"}, {"title": "b"}],
                "pagination": {"currentPage": 2, "pageCount": 7}
            }
        }));
        assert_eq!(state.items().len(), 2);
        assert_eq!(
            state.pagination(),
            Pagination {
                current_page: 2,
                page_count: 7
            }
        );
    }

    #[test]
    fn test_top_level_fallback() {
        let state = ListingState::new(json!({
            "items": [{"title": "a"}],
            "pagination": {"currentPage": "3", "pageCount": "4"}
        }));
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.pagination().current_page, 3);
        assert_eq!(state.pagination().page_count, 4);
    }

    #[test]
    fn test_pagination_defaults() {
        let state = ListingState::new(json!({"searchResults": {}}));
        assert!(state.items().is_empty());
        assert_eq!(state.pagination(), Pagination::default());
        assert_eq!(state.pagination().current_page, 1);
        assert_eq!(state.pagination().page_count, 0);
    }

    #[test]
    fn test_escalate_keeps_page() {
        let req = PageRequest::new("https://www.caterer.com/jobs?page=3", 3, Tier::Http);
        let esc = req.escalate();
        assert_eq!(esc.page, 3);
        assert_eq!(esc.tier, Tier::Browser);
        assert_eq!(esc.url, req.url);
    }
}
