//! Mutable state of a single harvest run.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::trace;
use url::Url;

use crate::config::SearchSpec;
use crate::error::Result;
use crate::models::{ListingState, PageRequest, Pagination, RunStats, Tier};
use crate::scrapers::shaper::shape_items;
use crate::sink::RecordSink;
use crate::utils::dates::keep_by_recency;
use crate::utils::url::paginate;

/// Counts from emitting one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageEmission {
    pub extracted: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub filtered: usize,
}

/// Everything a run mutates. Owned by the controller; never shared.
#[derive(Debug)]
pub struct RunState {
    desired: u32,
    saved: u32,
    seen_urls: HashSet<String>,
    requested: HashSet<(u32, Tier)>,
    blocked_pages: VecDeque<PageRequest>,
    pub stats: RunStats,
    last_pagination: Option<Pagination>,
}

impl RunState {
    pub fn new(desired: u32) -> Self {
        Self {
            desired,
            saved: 0,
            seen_urls: HashSet::new(),
            requested: HashSet::new(),
            blocked_pages: VecDeque::new(),
            stats: RunStats::default(),
            last_pagination: None,
        }
    }

    pub fn saved(&self) -> u32 {
        self.saved
    }

    pub fn is_satisfied(&self) -> bool {
        self.saved >= self.desired
    }

    pub fn last_pagination(&self) -> Option<Pagination> {
        self.last_pagination
    }

    /// Record that `request` is about to be loaded. `false` if this page was
    /// already requested on the same tier.
    pub fn mark_requested(&mut self, request: &PageRequest) -> bool {
        self.requested.insert((request.page, request.tier))
    }

    /// Queue a page for the browser tier.
    pub fn push_blocked(&mut self, request: &PageRequest) {
        if self.blocked_pages.iter().all(|r| r.page != request.page) {
            self.blocked_pages.push_back(request.escalate());
        }
    }

    pub fn take_blocked(&mut self) -> Vec<PageRequest> {
        self.blocked_pages.drain(..).collect()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked_pages.len()
    }

    /// Shape, dedup, filter and emit the records of one parsed page.
    ///
    /// Stops as soon as the desired count is reached. Every record is written
    /// to the sink before its url enters the seen set.
    pub async fn emit_page(
        &mut self,
        request: &PageRequest,
        listing: &ListingState,
        search: &SearchSpec,
        sink: &mut dyn RecordSink,
        now: DateTime<Utc>,
    ) -> Result<PageEmission> {
        self.stats.record_page(request.tier);
        self.last_pagination = Some(listing.pagination());

        let records = shape_items(listing, now);
        let mut emission = PageEmission {
            extracted: records.len(),
            ..Default::default()
        };
        self.stats.records_extracted += records.len() as u64;

        for record in records {
            if self.is_satisfied() {
                break;
            }
            if self.seen_urls.contains(&record.url) {
                trace!("Duplicate {}", record.url);
                emission.duplicates += 1;
                continue;
            }
            if !keep_by_recency(record.date_posted.as_deref(), search.posted_within, now) {
                trace!("Outside {} window: {}", search.posted_within, record.url);
                emission.filtered += 1;
                continue;
            }

            let record = record.with_provenance(&search.keyword, &search.location, now);
            sink.push_record(&record).await?;
            self.seen_urls.insert(record.url);
            self.saved += 1;
            emission.saved += 1;
        }

        self.stats.records_saved = u64::from(self.saved);
        self.stats.duplicates_skipped += emission.duplicates as u64;
        self.stats.recency_filtered += emission.filtered as u64;

        Ok(emission)
    }

    /// Next page on the same tier, if the run still wants one.
    pub fn successor(
        &self,
        request: &PageRequest,
        pagination: Pagination,
        start_url: &Url,
        max_pages: u32,
    ) -> Option<PageRequest> {
        if self.is_satisfied() || request.page >= max_pages || request.page >= pagination.page_count
        {
            return None;
        }
        let next = request.page + 1;
        Some(PageRequest::new(
            paginate(start_url, next).to_string(),
            next,
            request.tier,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::utils::dates::RecencyWindow;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn search(window: RecencyWindow) -> SearchSpec {
        let mut spec = SearchSpec::from_input(&json!({"keyword": "chef", "location": "london"})).unwrap();
        spec.posted_within = window;
        spec
    }

    fn listing(entries: serde_json::Value, page_count: u32) -> ListingState {
        ListingState::new(json!({
            "searchResults": {
                "items": entries,
                "pagination": {"currentPage": 1, "pageCount": page_count}
            }
        }))
    }

    fn page_one() -> PageRequest {
        PageRequest::new("https://www.caterer.com/jobs/chef/in-london", 1, Tier::Http)
    }

    #[tokio::test]
    async fn test_emit_page_stops_at_desired() {
        let mut state = RunState::new(2);
        let mut sink = MemorySink::new();
        let entries = json!([
            {"title": "A", "url": "/job/a"},
            {"title": "B", "url": "/job/b"},
            {"title": "C", "url": "/job/c"}
        ]);

        let emission = state
            .emit_page(&page_one(), &listing(entries, 1), &search(RecencyWindow::Any), &mut sink, now())
            .await
            .unwrap();

        assert_eq!(emission.extracted, 3);
        assert_eq!(emission.saved, 2);
        assert!(state.is_satisfied());
        assert_eq!(sink.urls(), vec!["https://www.caterer.com/job/a", "https://www.caterer.com/job/b"]);
        assert_eq!(sink.records[0].keyword_search.as_deref(), Some("chef"));
        assert_eq!(sink.records[0].extracted_at.as_deref(), Some("2024-06-15T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_emit_page_dedups_and_filters() {
        let mut state = RunState::new(100);
        let mut sink = MemorySink::new();
        let entries = json!([
            {"title": "A", "url": "/job/a", "datePosted": "2 hours ago"},
            {"title": "A again", "url": "/job/a"},
            {"title": "Old", "url": "/job/old", "datePosted": "3 days ago"},
            {"title": "Yesterday", "url": "/job/y", "datePosted": "yesterday"}
        ]);

        let emission = state
            .emit_page(&page_one(), &listing(entries, 1), &search(RecencyWindow::Day), &mut sink, now())
            .await
            .unwrap();

        assert_eq!(emission.saved, 2);
        assert_eq!(emission.duplicates, 1);
        assert_eq!(emission.filtered, 1);
        assert_eq!(state.stats.duplicates_skipped, 1);
        assert_eq!(state.stats.recency_filtered, 1);
        assert_eq!(state.stats.records_saved, 2);
        assert_eq!(state.stats.http_pages, 1);
    }

    #[test]
    fn test_successor_rules() {
        let state = RunState::new(10);
        let start = Url::parse("https://www.caterer.com/jobs/chef").unwrap();
        let p = |current, count| Pagination {
            current_page: current,
            page_count: count,
        };

        let next = state.successor(&page_one(), p(1, 3), &start, 20).unwrap();
        assert_eq!(next.page, 2);
        assert_eq!(next.tier, Tier::Http);
        assert_eq!(next.url, "https://www.caterer.com/jobs/chef?page=2");

        assert!(state.successor(&page_one(), p(1, 3), &start, 1).is_none());
        assert!(state.successor(&page_one(), p(1, 1), &start, 20).is_none());
        assert!(state.successor(&page_one(), p(1, 0), &start, 20).is_none());

        let browser_page = PageRequest::new(start.as_str(), 1, Tier::Browser);
        assert_eq!(state.successor(&browser_page, p(1, 2), &start, 20).unwrap().tier, Tier::Browser);
    }

    #[test]
    fn test_blocked_queue_escalates_once() {
        let mut state = RunState::new(10);
        state.push_blocked(&page_one());
        state.push_blocked(&page_one());
        let blocked = state.take_blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].tier, Tier::Browser);
        assert_eq!(state.blocked_len(), 0);
    }
}
