//! Search and pagination URL construction.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Scheme and host of the job board.
pub const SITE_BASE: &str = "https://www.caterer.com";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());

/// Turn free text into a path slug: lowercase, whitespace runs become `-`,
/// anything outside `[a-z0-9-]` is dropped.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let dashed = WHITESPACE.replace_all(&lowered, "-");
    NON_SLUG.replace_all(&dashed, "").into_owned()
}

/// Build the canonical first-page search URL for a keyword and location.
pub fn canonical_start(keyword: &str, location: &str) -> String {
    let kw = slugify(keyword);
    let loc = slugify(location);

    let path = match (kw.is_empty(), loc.is_empty()) {
        (false, false) => format!("/jobs/{}/in-{}", kw, loc),
        (false, true) => format!("/jobs/{}", kw),
        (true, false) => format!("/jobs/in-{}", loc),
        (true, true) => "/jobs".to_string(),
    };

    format!("{}{}", SITE_BASE, path)
}

/// Set the `page` query parameter on a start URL.
///
/// Page 1 is rendered without the parameter; any `page` already present on
/// the start URL is replaced.
pub fn paginate(start: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = start
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = start.clone();
    url.set_query(None);

    if kept.is_empty() && page <= 1 {
        return url;
    }

    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        if page > 1 {
            pairs.append_pair("page", &page.to_string());
        }
    }

    url
}

/// Read the `page` query parameter, treating a missing one as page 1.
pub fn page_number(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

/// Resolve a possibly relative href against `base`.
///
/// Returns `None` for empty, malformed or non-HTTP(S) input instead of failing.
pub fn to_absolute(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let resolved = base.join(href).ok()?;

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Head   Chef "), "head-chef");
        assert_eq!(slugify("Sous-Chef (Nights)"), "sous-chef-nights");
        assert_eq!(slugify("Café & Bar"), "caf--bar");
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn test_canonical_start_shapes() {
        assert_eq!(
            canonical_start("chef", "london"),
            "https://www.caterer.com/jobs/chef/in-london"
        );
        assert_eq!(
            canonical_start("Head Chef", ""),
            "https://www.caterer.com/jobs/head-chef"
        );
        assert_eq!(
            canonical_start("", "Milton Keynes"),
            "https://www.caterer.com/jobs/in-milton-keynes"
        );
        assert_eq!(canonical_start("", ""), "https://www.caterer.com/jobs");
        assert_eq!(canonical_start("!!!", "???"), "https://www.caterer.com/jobs");
    }

    #[test]
    fn test_paginate_sets_and_replaces_page() {
        let start = Url::parse("https://www.caterer.com/jobs/chef").unwrap();
        assert_eq!(
            paginate(&start, 3).as_str(),
            "https://www.caterer.com/jobs/chef?page=3"
        );

        let with_page = Url::parse("https://www.caterer.com/jobs/chef?page=2&sort=date").unwrap();
        assert_eq!(
            paginate(&with_page, 5).as_str(),
            "https://www.caterer.com/jobs/chef?sort=date&page=5"
        );
    }

    #[test]
    fn test_paginate_page_one_equivalence() {
        let start = Url::parse("https://www.caterer.com/jobs/chef?page=4").unwrap();
        let first = paginate(&start, 1);
        assert_eq!(first.as_str(), "https://www.caterer.com/jobs/chef");
        assert_eq!(page_number(&first), 1);
        assert_eq!(page_number(&paginate(&start, 9)), 9);
    }

    #[test]
    fn test_to_absolute() {
        assert_eq!(
            to_absolute("/job/chef/acme-job123", SITE_BASE).as_deref(),
            Some("https://www.caterer.com/job/chef/acme-job123")
        );
        assert_eq!(
            to_absolute("https://example.com/x", SITE_BASE).as_deref(),
            Some("https://example.com/x")
        );
        assert_eq!(to_absolute("", SITE_BASE), None);
        assert_eq!(to_absolute("javascript:void(0)", SITE_BASE), None);
        assert_eq!(to_absolute("/job/1", "not a url"), None);
    }
}
