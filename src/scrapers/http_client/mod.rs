//! Plain HTTP fetch tier.
//!
//! Fetches listing pages through a pool of browser-like sessions, paces
//! requests, and classifies each response as parsed, blocked or failed.

mod pacer;
mod response;
mod session;
mod user_agent;

pub use pacer::Pacer;
pub use response::{classify_response, HttpResponse, ResponseClass};
pub use session::{Session, SessionOptions, SessionPool};
pub use user_agent::{random_user_agent, IMPERSONATE_USER_AGENTS};

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::tier::{PageOutcome, PageSource};
use crate::config::{HarvestSettings, ProxyConfig};
use crate::error::Result;
use crate::models::{PageRequest, Tier};

/// Result of one attempt, before retry bookkeeping.
enum Attempt {
    Done(PageOutcome),
    Retry(String),
}

/// The fast tier: stateless GETs with rotating sessions.
#[derive(Debug, Clone)]
pub struct HttpTier {
    pool: SessionPool,
    pacer: Pacer,
    max_retries: u32,
    concurrency: usize,
    min_body_length: usize,
}

impl HttpTier {
    pub fn new(settings: &HarvestSettings, proxy: &ProxyConfig) -> Self {
        Self::with_pacer(settings, proxy, Pacer::new(settings.pacing_range()))
    }

    pub fn with_pacer(settings: &HarvestSettings, proxy: &ProxyConfig, pacer: Pacer) -> Self {
        let pool = SessionPool::new(SessionOptions {
            timeout: settings.http_timeout(),
            proxy_url: proxy.url.clone(),
            pool_size: settings.session_pool_size,
            max_uses: settings.session_max_uses,
        });

        Self {
            pool,
            pacer,
            max_retries: settings.max_retries,
            concurrency: settings.http_concurrency.max(1),
            min_body_length: settings.min_body_length,
        }
    }

    /// GET a URL through a pooled session.
    pub async fn get(&self, session: &Session, url: &str) -> Result<HttpResponse> {
        let start = Instant::now();
        let response = session.client.get(url).send().await?;
        let response = HttpResponse::read(response).await?;
        debug!(
            "GET {} -> {} ({} bytes, {}, {:?}, session {})",
            url,
            response.status,
            response.body.len(),
            response.content_type().unwrap_or("no content-type"),
            start.elapsed(),
            session.id
        );
        Ok(response)
    }

    async fn attempt(&self, url: &str) -> Attempt {
        self.pacer.acquire().await;

        let session = match self.pool.checkout().await {
            Ok(s) => s,
            Err(e) => return Attempt::Done(PageOutcome::Failed(e.to_string())),
        };

        let response = match self.get(&session, url).await {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        match classify_response(response.status, &response.body, self.min_body_length) {
            ResponseClass::Parsed(state) => Attempt::Done(PageOutcome::Parsed(state)),
            ResponseClass::Blocked(reason) => {
                self.pool.retire(session.id).await;
                Attempt::Done(PageOutcome::Blocked(reason))
            }
            ResponseClass::Unexpected(status) => Attempt::Retry(format!("HTTP {}", status)),
        }
    }
}

#[async_trait]
impl PageSource for HttpTier {
    fn tier(&self) -> Tier {
        Tier::Http
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn load(&self, request: &PageRequest) -> PageOutcome {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            match self.attempt(&request.url).await {
                Attempt::Done(PageOutcome::Blocked(reason)) => {
                    info!("Page {} blocked on HTTP tier: {}", request.page, reason);
                    return PageOutcome::Blocked(reason);
                }
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(error) => {
                    warn!(
                        "HTTP attempt {}/{} for page {} failed: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        request.page,
                        error
                    );
                    last_error = error;
                }
            }
        }

        PageOutcome::Failed(last_error)
    }

    async fn shutdown(&self) {
        self.pool.clear().await;
    }
}
