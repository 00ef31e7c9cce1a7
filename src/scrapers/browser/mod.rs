//! Headless-browser fetch tier for pages that refuse plain HTTP.
//!
//! Uses chromiumoxide (CDP). Each page request gets a fresh tab with the
//! stealth scripts installed and heavy resources blocked; the tab is closed on
//! every exit path.

mod config;
#[cfg(feature = "browser")]
mod fetch;
mod stealth;

pub use config::{BrowserEngineConfig, BROWSER_HEADLESS_ENV, BROWSER_URL_ENV};
pub use stealth::STEALTH_SCRIPTS;

use async_trait::async_trait;
use tracing::warn;

use super::tier::{PageOutcome, PageSource};
use crate::models::{PageRequest, Tier};

#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use super::http_client::random_user_agent;
#[cfg(feature = "browser")]
use crate::error::{HarvestError, Result};
#[cfg(feature = "browser")]
use super::tier::BlockReason;
#[cfg(feature = "browser")]
use fetch::cdp_error;

/// Browser tier backed by a lazily launched Chrome.
#[cfg(feature = "browser")]
pub struct BrowserTier {
    config: BrowserEngineConfig,
    browser: Mutex<Option<Arc<Browser>>>,
}

#[cfg(feature = "browser")]
impl BrowserTier {
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    fn find_chrome() -> Result<PathBuf> {
        if let Some(path) = Self::CHROME_PATHS
            .iter()
            .map(std::path::Path::new)
            .find(|p| p.exists())
        {
            info!("Found Chrome at: {}", path.display());
            return Ok(path.to_path_buf());
        }

        for cmd in ["google-chrome", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if output.status.success() && !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }

        Err(HarvestError::Runtime(
            "Chrome/Chromium not found; install it or set BROWSER_URL".into(),
        ))
    }

    fn spawn_handler(mut handler: chromiumoxide::Handler) {
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
    }

    async fn launch(&self) -> Result<Browser> {
        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(Self::find_chrome()?)
            .request_timeout(self.config.timeout());
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = self.config.proxy_server() {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--lang=en-GB")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| HarvestError::Runtime(format!("Failed to build browser config: {}", e)))?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Runtime(format!("Failed to launch browser: {}", e)))?;
        Self::spawn_handler(handler);
        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> Result<Browser> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let version: serde_json::Value = reqwest::get(&version_url).await?.json().await?;
        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HarvestError::Runtime("No webSocketDebuggerUrl in response".into()))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: self.config.timeout(),
            ..Default::default()
        };
        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| HarvestError::Runtime(format!("Failed to connect to browser: {}", e)))?;
        Self::spawn_handler(handler);
        Ok(browser)
    }

    /// Launch or connect on first use.
    async fn ensure_browser(&self) -> Result<Arc<Browser>> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let browser = match self.config.remote_url.clone() {
            Some(url) => self.connect_remote(&url).await?,
            None => self.launch().await?,
        };
        let browser = Arc::new(browser);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    async fn open_page(&self) -> Result<Page> {
        let browser = self.ensure_browser().await?;
        browser.new_page("about:blank").await.map_err(cdp_error)
    }

    /// One attempt; the page is closed whatever happens.
    async fn fetch_state(&self, url: &str) -> Result<PageOutcome> {
        let page = self.open_page().await?;
        let credentials = self.config.proxy_credentials();
        let interceptor = match fetch::intercept_requests(&page, credentials).await {
            Ok(task) => Some(task),
            Err(e) => {
                debug!("Request interception unavailable: {}", e);
                None
            }
        };

        let result = tokio::time::timeout(self.config.timeout(), self.fetch_inner(&page, url))
            .await
            .unwrap_or_else(|_| {
                Err(HarvestError::Browser(format!(
                    "Timed out after {}s loading {}",
                    self.config.timeout, url
                )))
            });

        if let Some(task) = interceptor {
            task.abort();
        }
        if let Err(e) = page.close().await {
            debug!("Closing page failed: {}", e);
        }
        result
    }

    async fn fetch_inner(&self, page: &Page, url: &str) -> Result<PageOutcome> {
        fetch::install_stealth(page, random_user_agent()).await?;

        info!("Navigating to {}", url);
        fetch::navigate(page, url, self.config.navigation_timeout()).await?;
        fetch::wait_for_dom(page, self.config.navigation_timeout()).await;
        tokio::time::sleep(self.config.settle_delay()).await;

        Ok(match fetch::read_state(page).await? {
            Some(state) => PageOutcome::Parsed(state),
            None => PageOutcome::Blocked(BlockReason::MissingState),
        })
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageSource for BrowserTier {
    fn tier(&self) -> Tier {
        Tier::Browser
    }

    async fn load(&self, request: &PageRequest) -> PageOutcome {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            match self.fetch_state(&request.url).await {
                Ok(PageOutcome::Parsed(state)) => return PageOutcome::Parsed(state),
                Ok(PageOutcome::Blocked(reason)) => {
                    warn!(
                        "Browser attempt {}/{} for page {}: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        request.page,
                        reason
                    );
                    last_error = reason.to_string();
                }
                Ok(PageOutcome::Failed(msg)) => last_error = msg,
                Err(e @ HarvestError::Runtime(_)) => {
                    warn!("Browser unavailable: {}", e);
                    return PageOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    warn!(
                        "Browser attempt {}/{} for page {} failed: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        request.page,
                        e
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        PageOutcome::Failed(last_error)
    }

    async fn shutdown(&self) {
        let Some(browser) = self.browser.lock().await.take() else {
            return;
        };
        if self.config.remote_url.is_some() {
            return;
        }
        match Arc::try_unwrap(browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    debug!("Browser close failed: {}", e);
                }
                let _ = browser.wait().await;
            }
            Err(_) => debug!("Browser still shared at shutdown; dropping handle"),
        }
    }
}

// Stub for when the browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserTier;

#[cfg(not(feature = "browser"))]
impl BrowserTier {
    pub fn new(_config: BrowserEngineConfig) -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageSource for BrowserTier {
    fn tier(&self) -> Tier {
        Tier::Browser
    }

    async fn load(&self, request: &PageRequest) -> PageOutcome {
        warn!("Page {} needs the browser tier, which is not compiled in", request.page);
        PageOutcome::Failed(
            "Browser support not compiled. Rebuild with: cargo build --features browser".into(),
        )
    }
}
