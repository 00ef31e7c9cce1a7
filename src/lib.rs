//! jobharvest - job listing harvester for caterer.com.
//!
//! Pulls search-result pages, reads the result list embedded in each page,
//! and writes deduplicated job records. Pages that refuse plain HTTP are
//! retried in a headless browser.

pub mod config;
pub mod error;
pub mod harvest;
pub mod models;
pub mod scrapers;
pub mod sink;
pub mod utils;

pub use config::{HarvestSettings, ProxyConfig, SearchSpec};
pub use error::{HarvestError, Result};
pub use harvest::{HarvestController, ShutdownHandle};
pub use models::{JobRecord, ListingState, PageRequest, RunStats, Tier};
pub use scrapers::{BrowserTier, HttpTier, PageOutcome, PageSource};
pub use sink::{JsonLinesSink, MemorySink, RecordSink};
