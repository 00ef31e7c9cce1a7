//! Embedded result-list state extraction.
//!
//! Listing pages ship their search results as a JSON object assigned in an
//! inline script:
//!
//! ```text
//! window.__PRELOADED_STATE__["app-unifiedResultlist"] = { ... };
//! ```
//!
//! The object is cut out with a brace-balanced, string-aware scan and then
//! handed to serde_json. A regex cannot do the outer match: values contain
//! nested braces and escaped quotes.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::models::ListingState;

/// Key of the result-list entry in the page's preloaded state.
pub const STATE_KEY: &str = "app-unifiedResultlist";

/// Exact text that precedes the assignment.
const STATE_MARKER: &str = "\"app-unifiedResultlist\"]";

/// Global the browser tier reads the same entry from.
pub const STATE_GLOBAL: &str = "__PRELOADED_STATE__";

static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// Find and parse the result-list state in a listing page.
///
/// Scripts are tried in document order; a script whose object fails to parse
/// does not stop the scan.
pub fn extract_listing_state(html: &str) -> Option<ListingState> {
    let document = Html::parse_document(html);

    for script in document.select(&SCRIPT) {
        if script.value().attr("src").is_some() {
            continue;
        }
        let text: String = script.text().collect();
        if !text.contains(STATE_KEY) {
            continue;
        }
        if let Some(state) = state_from_script(&text) {
            return Some(state);
        }
    }

    None
}

/// Parse the state object out of one script body.
pub fn state_from_script(text: &str) -> Option<ListingState> {
    let mut cursor = 0;

    while let Some(pos) = text[cursor..].find(STATE_MARKER) {
        let after_marker = cursor + pos + STATE_MARKER.len();

        if let Some(raw) = object_after_assignment(text, after_marker) {
            match serde_json::from_str::<Value>(raw) {
                Ok(document) => return Some(ListingState::new(document)),
                Err(e) => debug!("Result-list state did not parse as JSON: {}", e),
            }
        }

        cursor = after_marker;
    }

    None
}

/// Locate `= {` after `from` and return the balanced object that follows.
fn object_after_assignment(text: &str, from: usize) -> Option<&str> {
    let eq = from + text[from..].find('=')?;
    let rest = &text[eq + 1..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let start = text.len() - trimmed.len();
    balanced_object(text, start)
}

/// Return the `{ ... }` slice starting at `start`, including the closing brace.
///
/// Braces inside string literals are ignored; a backslash inside a string
/// escapes exactly one following character. `None` if the object never
/// closes.
pub fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_str = false;
    let mut escape = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
