//! Listing response wrapper and block classification.

use std::collections::HashMap;

use reqwest::StatusCode;

use crate::models::ListingState;
use crate::scrapers::state::extract_listing_state;
use crate::scrapers::tier::BlockReason;

/// Body substrings that mark an anti-bot interstitial.
const DENIED_MARKERS: &[&str] = &["Access Denied", "blocked"];

/// A fully read listing response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Read the whole response, keeping headers for logging.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = extract_response_headers(&response);
        let body = response.text().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

fn extract_response_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// What a listing response amounts to.
#[derive(Debug, Clone)]
pub enum ResponseClass {
    Parsed(ListingState),
    Blocked(BlockReason),
    /// Non-2xx other than 403; worth retrying.
    Unexpected(StatusCode),
}

/// Classify a response by status and body.
///
/// 403 is a block; other non-2xx statuses are retryable failures. A 2xx
/// response is a block if it carries a denial marker, is shorter than
/// `min_body_length`, or has no extractable state.
pub fn classify_response(status: StatusCode, body: &str, min_body_length: usize) -> ResponseClass {
    if status == StatusCode::FORBIDDEN {
        return ResponseClass::Blocked(BlockReason::Forbidden);
    }
    if !status.is_success() {
        return ResponseClass::Unexpected(status);
    }
    if let Some(marker) = DENIED_MARKERS.iter().find(|m| body.contains(**m)) {
        return ResponseClass::Blocked(BlockReason::DeniedMarker(marker));
    }
    if body.len() < min_body_length {
        return ResponseClass::Blocked(BlockReason::ShortBody(body.len()));
    }
    match extract_listing_state(body) {
        Some(state) => ResponseClass::Parsed(state),
        None => ResponseClass::Blocked(BlockReason::MissingState),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_page(padding: usize) -> String {
        format!(
            "<html><body><div>{}</div><script>window.__PRELOADED_STATE__[\"app-unifiedResultlist\"] = \
             {{\"searchResults\":{{\"items\":[{{\"title\":\"Chef\",\"url\":\"/job/1\"}}]}}}};</script></body></html>",
            "x".repeat(padding)
        )
    }

    #[test]
    fn test_forbidden_is_blocked() {
        let class = classify_response(StatusCode::FORBIDDEN, &listing_page(6000), 5000);
        assert!(matches!(class, ResponseClass::Blocked(BlockReason::Forbidden)));
    }

    #[test]
    fn test_server_error_is_retryable() {
        let class = classify_response(StatusCode::BAD_GATEWAY, "", 5000);
        assert!(matches!(class, ResponseClass::Unexpected(s) if s == StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_denied_marker() {
        let body = format!("<html><h1>Access Denied</h1>{}</html>", "x".repeat(6000));
        let class = classify_response(StatusCode::OK, &body, 5000);
        assert!(matches!(
            class,
            ResponseClass::Blocked(BlockReason::DeniedMarker("Access Denied"))
        ));
    }

    #[test]
    fn test_short_body() {
        let class = classify_response(StatusCode::OK, &listing_page(0), 5000);
        assert!(matches!(class, ResponseClass::Blocked(BlockReason::ShortBody(_))));
    }

    #[test]
    fn test_missing_state() {
        let body = format!("<html><body>{}</body></html>", "x".repeat(6000));
        let class = classify_response(StatusCode::OK, &body, 5000);
        assert!(matches!(class, ResponseClass::Blocked(BlockReason::MissingState)));
    }

    #[test]
    fn test_parsed() {
        match classify_response(StatusCode::OK, &listing_page(6000), 5000) {
            ResponseClass::Parsed(state) => assert_eq!(state.items().len(), 1),
            other => panic!("expected parsed, got {:?}", other),
        }
    }
}
