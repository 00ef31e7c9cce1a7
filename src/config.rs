//! Run input and harvester tunables.
//!
//! The run input is a loosely typed JSON record. Bad values fall back to
//! defaults with a warning; only an input that is not an object at all is
//! rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use url::Url;

use crate::error::{HarvestError, Result};
use crate::utils::dates::RecencyWindow;
use crate::utils::url::{canonical_start, page_number, paginate};

/// Default number of records to collect.
pub const DEFAULT_RESULTS_WANTED: u32 = 100;

/// Default upper bound on the page number.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Environment variable consulted when the input carries no proxy URL.
pub const PROXY_URL_ENV: &str = "PROXY_URL";

/// Immutable description of one harvest run.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub keyword: String,
    pub location: String,
    /// First listing page; page `n` is derived from it.
    pub start_url: Url,
    pub results_wanted: u32,
    pub max_pages: u32,
    pub posted_within: RecencyWindow,
    pub proxy: ProxyConfig,
}

impl SearchSpec {
    /// Build a search from a raw input record.
    pub fn from_input(input: &Value) -> Result<Self> {
        let obj = input.as_object().ok_or_else(|| {
            HarvestError::Configuration("input must be a JSON object".to_string())
        })?;

        let keyword = read_string(obj, "keyword");
        let location = read_string(obj, "location");

        let start_url = match explicit_start_url(obj).and_then(|s| parse_start_url(&s)) {
            Some(url) => {
                let page = page_number(&url);
                if page != 1 {
                    warn!("Start URL points at page {}; harvesting from page 1", page);
                }
                paginate(&url, 1)
            }
            None => Url::parse(&canonical_start(&keyword, &location))
                .map_err(|e| HarvestError::Configuration(e.to_string()))?,
        };

        let results_wanted =
            coerce_positive(obj.get("results_wanted"), "results_wanted", DEFAULT_RESULTS_WANTED);
        let max_pages = coerce_positive(obj.get("max_pages"), "max_pages", DEFAULT_MAX_PAGES);

        let posted_within = match obj.get("postedWithin") {
            None | Some(Value::Null) => RecencyWindow::Any,
            Some(Value::String(s)) => s.parse::<RecencyWindow>().unwrap_or_else(|e| {
                warn!("{}; using 'any'", e);
                RecencyWindow::Any
            }),
            Some(other) => {
                warn!("postedWithin must be a string, got {}; using 'any'", other);
                RecencyWindow::Any
            }
        };

        let proxy = ProxyConfig::from_input(obj.get("proxyConfiguration")).with_env_overrides();

        Ok(Self {
            keyword,
            location,
            start_url,
            results_wanted,
            max_pages,
            posted_within,
            proxy,
        })
    }
}

fn read_string(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => {
            warn!("Ignoring non-string {}: {}", key, other);
            String::new()
        }
    }
}

fn parse_start_url(s: &str) -> Option<Url> {
    match Url::parse(s) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            warn!("Ignoring start URL with unsupported scheme: {}", url);
            None
        }
        Err(e) => {
            warn!("Ignoring invalid start URL '{}': {}", s, e);
            None
        }
    }
}

/// `startUrl` wins over `startUrls`; list entries may be strings or `{ "url": ... }`.
fn explicit_start_url(obj: &Map<String, Value>) -> Option<String> {
    if let Some(s) = obj.get("startUrl").and_then(|v| v.as_str()) {
        if !s.trim().is_empty() {
            return Some(s.trim().to_string());
        }
    }

    obj.get("startUrls")
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())
        .and_then(|first| match first {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("url").and_then(|u| u.as_str()),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Coerce a positive integer, falling back to `default` on anything else.
fn coerce_positive(value: Option<&Value>, name: &str, default: u32) -> u32 {
    let parsed = match value {
        None | Some(Value::Null) => return default,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f.floor() as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match parsed.filter(|n| *n > 0) {
        Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
        None => {
            warn!("Invalid {} {:?}, using default {}", name, value, default);
            default
        }
    }
}

/// Proxy settings handed to both fetch tiers.
///
/// The raw object is kept as-is for the host runtime; only a concrete proxy
/// URL is interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub raw: Value,
    pub url: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            raw: default_proxy_configuration(),
            url: None,
        }
    }
}

/// Residential GB proxy group, the default when no proxy input is given.
pub fn default_proxy_configuration() -> Value {
    json!({
        "useApifyProxy": true,
        "apifyProxyGroups": ["RESIDENTIAL"],
        "apifyProxyCountry": "GB"
    })
}

impl ProxyConfig {
    pub fn from_input(raw: Option<&Value>) -> Self {
        let Some(raw) = raw.filter(|v| v.is_object()) else {
            return Self::default();
        };

        let url = raw
            .get("proxyUrl")
            .and_then(|v| v.as_str())
            .or_else(|| {
                raw.get("proxyUrls")
                    .and_then(|v| v.as_array())
                    .and_then(|a| a.iter().find_map(|u| u.as_str()))
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            raw: raw.clone(),
            url,
        }
    }

    /// Fill the proxy URL from `PROXY_URL` when the input did not provide one.
    pub fn with_env_overrides(mut self) -> Self {
        if self.url.is_none() {
            self.url = std::env::var(PROXY_URL_ENV)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        self
    }
}

/// Harvester tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarvestSettings {
    /// Per-request timeout on the HTTP tier, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Per-page timeout on the browser tier, in seconds.
    #[serde(default = "default_browser_timeout")]
    pub browser_timeout_secs: u64,

    /// Navigation timeout inside the browser, in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Pacing delay bounds between HTTP requests, in milliseconds.
    #[serde(default = "default_pacing_min")]
    pub pacing_min_ms: u64,
    #[serde(default = "default_pacing_max")]
    pub pacing_max_ms: u64,

    /// Retries per tier after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum in-flight HTTP page requests.
    #[serde(default = "default_http_concurrency")]
    pub http_concurrency: usize,

    /// Bodies shorter than this are treated as block pages.
    #[serde(default = "default_min_body_length")]
    pub min_body_length: usize,

    /// Wait after DOM content loaded before reading page state, in milliseconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Number of HTTP sessions kept alive at once.
    #[serde(default = "default_session_pool_size")]
    pub session_pool_size: usize,

    /// Requests served by one session before it is retired.
    #[serde(default = "default_session_max_uses")]
    pub session_max_uses: u32,

    /// Escalate blocked pages to a headless browser.
    #[serde(default = "default_use_browser")]
    pub use_browser: bool,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_browser_timeout() -> u64 {
    60
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_pacing_min() -> u64 {
    2_000
}

fn default_pacing_max() -> u64 {
    4_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_http_concurrency() -> usize {
    2
}

fn default_min_body_length() -> usize {
    5_000
}

fn default_settle_delay() -> u64 {
    1_500
}

fn default_session_pool_size() -> usize {
    4
}

fn default_session_max_uses() -> u32 {
    5
}

fn default_use_browser() -> bool {
    true
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            browser_timeout_secs: default_browser_timeout(),
            navigation_timeout_secs: default_navigation_timeout(),
            pacing_min_ms: default_pacing_min(),
            pacing_max_ms: default_pacing_max(),
            max_retries: default_max_retries(),
            http_concurrency: default_http_concurrency(),
            min_body_length: default_min_body_length(),
            settle_delay_ms: default_settle_delay(),
            session_pool_size: default_session_pool_size(),
            session_max_uses: default_session_max_uses(),
            use_browser: default_use_browser(),
        }
    }
}

impl HarvestSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Pacing bounds with `min <= max` enforced.
    pub fn pacing_range(&self) -> (Duration, Duration) {
        let min = self.pacing_min_ms.min(self.pacing_max_ms);
        let max = self.pacing_min_ms.max(self.pacing_max_ms);
        (Duration::from_millis(min), Duration::from_millis(max))
    }
}
