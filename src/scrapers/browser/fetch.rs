//! Per-page steps of a browser-tier load.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::stealth::STEALTH_SCRIPTS;
use crate::error::{HarvestError, Result};
use crate::models::ListingState;
use crate::scrapers::state::{extract_listing_state, STATE_GLOBAL, STATE_KEY};

/// Resource types never worth downloading for a listing page.
const BLOCKED_RESOURCES: &[ResourceType] =
    &[ResourceType::Image, ResourceType::Media, ResourceType::Font];

const WAIT_FOR_DOM_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState !== 'loading') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

pub(crate) fn cdp_error(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Browser(e.to_string())
}

/// Expression returning the result-list state as a JSON string, or null.
fn state_expression() -> String {
    format!(
        "(() => {{ const s = window.{global}; \
         return s && s[{key:?}] ? JSON.stringify(s[{key:?}]) : null; }})()",
        global = STATE_GLOBAL,
        key = STATE_KEY
    )
}

pub(crate) async fn install_stealth(page: &Page, user_agent: &str) -> Result<()> {
    page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
        .await
        .map_err(cdp_error)?;

    for script in STEALTH_SCRIPTS {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            script.to_string(),
        ))
        .await
        .map_err(cdp_error)?;
    }
    Ok(())
}

/// Fail image, media and font requests before they leave the browser, and
/// answer proxy auth challenges when `credentials` are given.
///
/// Without credentials only the heavy resource types are paused. With them,
/// every request is paused so the challenge can be answered, and the rest are
/// let through. Returns the task doing this; abort it once the page closes.
pub(crate) async fn intercept_requests(
    page: &Page,
    credentials: Option<(String, String)>,
) -> Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(cdp_error)?;
    let mut challenges = page
        .event_listener::<EventAuthRequired>()
        .await
        .map_err(cdp_error)?;

    let patterns: Vec<RequestPattern> = if credentials.is_some() {
        vec![RequestPattern::builder().url_pattern("*").build()]
    } else {
        BLOCKED_RESOURCES
            .iter()
            .map(|rt| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(rt.clone())
                    .build()
            })
            .collect()
    };
    page.execute(
        EnableParams::builder()
            .patterns(patterns)
            .handle_auth_requests(credentials.is_some())
            .build(),
    )
    .await
    .map_err(cdp_error)?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        let requests = async {
            while let Some(event) = paused.next().await {
                let outcome = if BLOCKED_RESOURCES.contains(&event.resource_type) {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("Could not answer paused {:?} request: {}", event.resource_type, e);
                }
            }
        };

        let auth = async {
            let Some((username, password)) = credentials else {
                return;
            };
            while let Some(event) = challenges.next().await {
                let response = match AuthChallengeResponse::builder()
                    .response(AuthChallengeResponseResponse::ProvideCredentials)
                    .username(username.clone())
                    .password(password.clone())
                    .build()
                {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Could not build proxy credentials: {}", e);
                        return;
                    }
                };
                debug!("Answering auth challenge from {}", event.auth_challenge.origin);
                let params = ContinueWithAuthParams::new(event.request_id.clone(), response);
                if let Err(e) = page.execute(params).await {
                    debug!("Could not answer auth challenge: {}", e);
                }
            }
        };

        tokio::join!(requests, auth);
    }))
}

pub(crate) async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<()> {
    let params = NavigateParams::builder()
        .url(url)
        .build()
        .map_err(|e| HarvestError::Browser(format!("Invalid URL {}: {}", url, e)))?;

    tokio::time::timeout(timeout, page.execute(params))
        .await
        .map_err(|_| {
            HarvestError::Browser(format!(
                "Navigation timed out after {}s for {}",
                timeout.as_secs(),
                url
            ))
        })?
        .map_err(|e| HarvestError::Browser(format!("Navigation failed for {}: {}", url, e)))?;

    Ok(())
}

/// Wait for DOMContentLoaded, bounded by `timeout`.
pub(crate) async fn wait_for_dom(page: &Page, timeout: Duration) {
    match tokio::time::timeout(timeout, page.evaluate(WAIT_FOR_DOM_SCRIPT.to_string())).await {
        Ok(Ok(result)) => {
            let state: String = result.into_value().unwrap_or_else(|_| "unknown".into());
            debug!("Page ready state: {}", state);
        }
        Ok(Err(e)) => debug!("Could not check ready state: {}", e),
        Err(_) => warn!("Timeout waiting for DOMContentLoaded"),
    }
}

/// Read the state from the page global, falling back to scanning the HTML.
pub(crate) async fn read_state(page: &Page) -> Result<Option<ListingState>> {
    let from_global = match page.evaluate(state_expression()).await {
        Ok(result) => result.into_value::<Option<String>>().ok().flatten(),
        Err(e) => {
            debug!("State global not readable: {}", e);
            None
        }
    };

    if let Some(raw) = from_global {
        match serde_json::from_str(&raw) {
            Ok(document) => return Ok(Some(ListingState::new(document))),
            Err(e) => debug!("State global did not parse: {}", e),
        }
    }

    let html = page.content().await.map_err(cdp_error)?;
    Ok(extract_listing_state(&html))
}
