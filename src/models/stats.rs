//! Run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::listing::Tier;

/// Counters for one harvest run, written to the sink when the run ends.
///
/// The tier counters keep the wire names consumers of the dataset already
/// read (`cheerioUsed` for the HTTP tier, `playwrightUsed` for the browser).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub pages_processed: u64,
    pub records_extracted: u64,
    pub records_saved: u64,
    #[serde(rename = "cheerioUsed")]
    pub http_pages: u64,
    #[serde(rename = "playwrightUsed")]
    pub browser_pages: u64,
    pub blocked_pages: u64,
    pub dropped_pages: u64,
    pub duplicates_skipped: u64,
    pub recency_filtered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Count a page that yielded a listing state on `tier`.
    pub fn record_page(&mut self, tier: Tier) {
        self.pages_processed += 1;
        match tier {
            Tier::Http => self.http_pages += 1,
            Tier::Browser => self.browser_pages += 1,
        }
    }
}
