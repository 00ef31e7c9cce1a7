//! HTML fragment cleanup for listing snippets.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Decode the small entity set snippets actually use.
///
/// `&amp;` goes last so `&amp;lt;` stays a literal `&lt;`.
pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Strip tags, decode entities, collapse whitespace and trim.
pub fn clean_snippet(html: &str) -> String {
    let stripped = TAG.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}
