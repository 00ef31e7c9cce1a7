//! The harvest loop.
//!
//! Page 1 is seeded on the HTTP tier. Each parsed page emits its records and
//! may enqueue its successor on the same tier. Pages the HTTP tier could not
//! use are queued for the browser tier, which runs once the HTTP tier has
//! drained. The run ends when the desired count is reached or both tiers are
//! empty.
//!
//! Loads run concurrently up to each tier's limit, but all run-state updates
//! happen here, between awaits, so nothing needs a lock.
//!
//! A shutdown request abandons in-flight loads and queued pages, then takes
//! the normal finalize path so the stats are still written.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::state::RunState;
use crate::config::SearchSpec;
use crate::error::Result;
use crate::models::{PageRequest, RunStats, Tier};
use crate::scrapers::{PageOutcome, PageSource};
use crate::sink::RecordSink;

/// Requests a graceful stop of a running harvest.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct HarvestController<S: RecordSink> {
    search: SearchSpec,
    http: Box<dyn PageSource>,
    browser: Option<Box<dyn PageSource>>,
    sink: S,
    shutdown: ShutdownHandle,
}

impl<S: RecordSink> HarvestController<S> {
    pub fn new(search: SearchSpec, http: Box<dyn PageSource>, sink: S) -> Self {
        Self {
            search,
            http,
            browser: None,
            sink,
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Share an existing shutdown handle with this run.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until done or until Ctrl+C, finalizing either way.
    pub async fn run_until_shutdown(self) -> Result<(RunStats, S)> {
        let shutdown = self.shutdown_handle();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt; finishing up");
                shutdown.request();
            }
        });

        let result = self.run().await;
        listener.abort();
        result
    }

    /// Enable escalation of blocked pages to a browser tier.
    pub fn with_browser(mut self, browser: Box<dyn PageSource>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Run to completion and return the final statistics with the sink.
    ///
    /// Only sink failures end the run early.
    pub async fn run(self) -> Result<(RunStats, S)> {
        let Self {
            search,
            http,
            browser,
            mut sink,
            shutdown,
        } = self;

        let mut state = RunState::new(search.results_wanted);
        state.stats.started_at = Some(Utc::now());

        info!(
            "Harvesting {} (want {}, max {} pages, posted within {})",
            search.start_url, search.results_wanted, search.max_pages, search.posted_within
        );

        let seed = PageRequest::new(search.start_url.to_string(), 1, Tier::Http);
        let outcome = drain_tier(
            http.as_ref(),
            vec![seed],
            &search,
            &mut state,
            &mut sink,
            shutdown.subscribe(),
        )
        .await;

        let outcome = match outcome {
            Ok(()) if shutdown.is_requested() => {
                if state.blocked_len() > 0 {
                    info!(
                        "Shutdown requested; {} blocked page(s) not escalated",
                        state.blocked_len()
                    );
                }
                Ok(())
            }
            Ok(()) if !state.is_satisfied() && state.blocked_len() > 0 => match &browser {
                Some(browser) => {
                    let blocked = state.take_blocked();
                    info!("Escalating {} page(s) to the browser tier", blocked.len());
                    drain_tier(
                        browser.as_ref(),
                        blocked,
                        &search,
                        &mut state,
                        &mut sink,
                        shutdown.subscribe(),
                    )
                    .await
                }
                None => {
                    let dropped = state.take_blocked();
                    warn!(
                        "{} blocked page(s) dropped: browser tier disabled",
                        dropped.len()
                    );
                    state.stats.dropped_pages += dropped.len() as u64;
                    Ok(())
                }
            },
            other => other,
        };

        http.shutdown().await;
        if let Some(browser) = &browser {
            browser.shutdown().await;
        }

        if let Err(e) = outcome {
            error!("Harvest aborted: {}", e);
            return Err(e);
        }

        state.stats.finished_at = Some(Utc::now());
        sink.write_stats(&state.stats).await?;
        report_results(&state);

        Ok((state.stats, sink))
    }
}

/// Load `seed` and every successor on one tier until it drains or the run is
/// satisfied.
async fn drain_tier(
    source: &dyn PageSource,
    seed: Vec<PageRequest>,
    search: &SearchSpec,
    state: &mut RunState,
    sink: &mut dyn RecordSink,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let tier = source.tier();
    let limit = source.concurrency().max(1);
    let mut pending: VecDeque<PageRequest> = seed.into();
    let mut in_flight = FuturesUnordered::new();

    debug!("Draining {} tier ({} seeded, concurrency {})", tier, pending.len(), limit);

    loop {
        if *shutdown.borrow() {
            info!(
                "Stopping {} tier: {} in flight and {} queued page(s) abandoned",
                tier,
                in_flight.len(),
                pending.len()
            );
            break;
        }

        while in_flight.len() < limit && !state.is_satisfied() {
            let Some(request) = pending.pop_front() else {
                break;
            };
            if !state.mark_requested(&request) {
                debug!("Page {} already requested on {} tier", request.page, tier);
                continue;
            }
            debug!("Loading page {} on {} tier: {}", request.page, tier, request.url);
            in_flight.push(async move {
                let outcome = source.load(&request).await;
                (request, outcome)
            });
        }

        if in_flight.is_empty() {
            break;
        }

        let (request, outcome) = tokio::select! {
            next = in_flight.next() => match next {
                Some(done) => done,
                None => break,
            },
            _ = shutdown.changed() => continue,
        };

        match outcome {
            PageOutcome::Parsed(listing) => {
                let now = Utc::now().trunc_subsecs(3);
                let emission = state.emit_page(&request, &listing, search, sink, now).await?;
                let pagination = listing.pagination();
                info!(
                    "Page {}/{} via {}: {} extracted, {} saved (total {}/{})",
                    request.page,
                    pagination.page_count,
                    tier,
                    emission.extracted,
                    emission.saved,
                    state.saved(),
                    search.results_wanted
                );

                if let Some(next) =
                    state.successor(&request, pagination, &search.start_url, search.max_pages)
                {
                    pending.push_back(next);
                }
            }
            PageOutcome::Blocked(reason) if tier == Tier::Http => {
                state.stats.blocked_pages += 1;
                info!("Page {} blocked ({}); queued for browser", request.page, reason);
                state.push_blocked(&request);
            }
            PageOutcome::Failed(message) if tier == Tier::Http => {
                warn!("Page {} failed on HTTP tier: {}; queued for browser", request.page, message);
                state.push_blocked(&request);
            }
            PageOutcome::Blocked(reason) => {
                warn!("Page {} dropped: still blocked on browser ({})", request.page, reason);
                state.stats.dropped_pages += 1;
            }
            PageOutcome::Failed(message) => {
                warn!("Page {} dropped: {}", request.page, message);
                state.stats.dropped_pages += 1;
            }
        }

        if state.is_satisfied() {
            debug!("Desired count reached; abandoning {} in-flight load(s)", in_flight.len());
            break;
        }
    }

    Ok(())
}

fn report_results(state: &RunState) {
    let stats = &state.stats;
    if stats.pages_processed == 0 {
        error!(
            "Harvest produced nothing: {} page(s) blocked, {} dropped",
            stats.blocked_pages, stats.dropped_pages
        );
    } else if stats.dropped_pages > 0 {
        warn!(
            "Harvest complete with errors: {} pages ({} http, {} browser), {} saved, {} dropped",
            stats.pages_processed,
            stats.http_pages,
            stats.browser_pages,
            stats.records_saved,
            stats.dropped_pages
        );
    } else {
        info!(
            "Harvest complete: {} pages ({} http, {} browser), {} extracted, {} saved",
            stats.pages_processed,
            stats.http_pages,
            stats.browser_pages,
            stats.records_extracted,
            stats.records_saved
        );
    }
    if let Some(p) = state.last_pagination() {
        debug!("Last pagination seen: page {} of {}", p.current_page, p.page_count);
    }
}
