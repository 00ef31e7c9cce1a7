//! Bounded pool of reusable HTTP sessions.
//!
//! A session is one `reqwest::Client` with its own cookie jar and a fixed user
//! agent. Sessions are retired after `max_uses` checkouts, or at once when a
//! response through them was blocked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::{Client, Proxy};
use tokio::sync::Mutex;
use tracing::debug;

use super::user_agent::random_user_agent;
use crate::error::{HarvestError, Result};

/// Headers a desktop browser sends on a top-level navigation.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers
}

/// Options every session is built with.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub proxy_url: Option<String>,
    pub pool_size: usize,
    pub max_uses: u32,
}

/// A checked-out session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u64,
    pub client: Client,
    pub user_agent: &'static str,
    uses: u32,
}

#[derive(Debug, Clone)]
pub struct SessionPool {
    options: SessionOptions,
    sessions: Arc<Mutex<Vec<Session>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionPool {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            sessions: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn build_session(&self) -> Result<Session> {
        let user_agent = random_user_agent();
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .default_headers(browser_headers())
            .cookie_store(true)
            .timeout(self.options.timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = &self.options.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| HarvestError::Configuration(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Opened HTTP session {} ({})", id, user_agent);

        Ok(Session {
            id,
            client,
            user_agent,
            uses: 0,
        })
    }

    /// Check out the least-used session, opening a new one while under capacity.
    pub async fn checkout(&self) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;

        if sessions.len() < self.options.pool_size.max(1) {
            sessions.push(self.build_session()?);
        }

        let Some(idx) = sessions
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.uses)
            .map(|(i, _)| i)
        else {
            return Err(HarvestError::Fetch("session pool is empty".into()));
        };

        sessions[idx].uses += 1;
        let session = sessions[idx].clone();

        if session.uses >= self.options.max_uses.max(1) {
            debug!("Retiring HTTP session {} after {} uses", session.id, session.uses);
            sessions.swap_remove(idx);
        }

        Ok(session)
    }

    /// Drop a session, typically because a response through it was blocked.
    pub async fn retire(&self, id: u64) {
        let mut sessions = self.sessions.lock().await;
        if let Some(idx) = sessions.iter().position(|s| s.id == id) {
            debug!("Retiring blocked HTTP session {}", id);
            sessions.swap_remove(idx);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn clear(&self) {
        self.sessions.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize, max_uses: u32) -> SessionPool {
        SessionPool::new(SessionOptions {
            timeout: Duration::from_secs(5),
            proxy_url: None,
            pool_size: size,
            max_uses,
        })
    }

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let pool = pool(2, 100);
        let mut ids = Vec::new();
        for _ in 0..6 {
            ids.push(pool.checkout().await.unwrap().id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 2);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_session_retired_after_max_uses() {
        let pool = pool(1, 2);
        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(pool.len().await, 0);

        let c = pool.checkout().await.unwrap();
        assert_ne!(c.id, a.id);
    }

    #[tokio::test]
    async fn test_retire_removes_session() {
        let pool = pool(1, 10);
        let a = pool.checkout().await.unwrap();
        pool.retire(a.id).await;
        let b = pool.checkout().await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
