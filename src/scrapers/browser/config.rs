//! Browser tier configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{HarvestSettings, ProxyConfig};

/// Remote Chrome DevTools endpoint, e.g. `ws://localhost:9222`.
pub const BROWSER_URL_ENV: &str = "BROWSER_URL";

/// Set to `0` or `false` to run Chrome with a visible window.
pub const BROWSER_HEADLESS_ENV: &str = "BROWSER_HEADLESS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run headless (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL. Chrome gets it without credentials; any
    /// `user:pass@` part is answered on `Fetch.authRequired` instead.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Whole-request budget in seconds, navigation included.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Navigation budget in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Pause after DOM content loaded, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Connect to this DevTools endpoint instead of launching Chrome.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    1500
}

fn default_max_retries() -> u32 {
    2
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            navigation_timeout: default_navigation_timeout(),
            settle_delay_ms: default_settle_delay_ms(),
            max_retries: default_max_retries(),
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    pub fn from_settings(settings: &HarvestSettings, proxy: &ProxyConfig) -> Self {
        Self {
            proxy: proxy.url.clone(),
            timeout: settings.browser_timeout_secs,
            navigation_timeout: settings.navigation_timeout_secs,
            settle_delay_ms: settings.settle_delay_ms,
            max_retries: settings.max_retries,
            ..Self::default()
        }
    }

    /// Apply `BROWSER_URL` and `BROWSER_HEADLESS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(BROWSER_URL_ENV) {
            if !url.trim().is_empty() {
                self.remote_url = Some(url.trim().to_string());
            }
        }
        if let Ok(v) = env::var(BROWSER_HEADLESS_ENV) {
            if v == "0" || v.eq_ignore_ascii_case("false") {
                self.headless = false;
            }
        }
        self
    }

    /// Value for `--proxy-server`, with any credentials removed.
    pub fn proxy_server(&self) -> Option<String> {
        let raw = self.proxy.as_deref()?;
        let Ok(mut url) = Url::parse(raw) else {
            return Some(raw.to_string());
        };
        if url.username().is_empty() && url.password().is_none() {
            return Some(raw.to_string());
        }
        // Only fails for cannot-be-a-base URLs, which carry no credentials.
        let _ = url.set_username("");
        let _ = url.set_password(None);
        Some(url.as_str().trim_end_matches('/').to_string())
    }

    /// Decoded `(username, password)` from the proxy URL, if it has any.
    pub fn proxy_credentials(&self) -> Option<(String, String)> {
        let url = Url::parse(self.proxy.as_deref()?).ok()?;
        if url.username().is_empty() {
            return None;
        }
        let decode = |s: &str| {
            url::form_urlencoded::parse(format!("v={}", s.replace('+', "%2B")).as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };
        Some((
            decode(url.username()),
            url.password().map(decode).unwrap_or_default(),
        ))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
