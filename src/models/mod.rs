//! Data models for the harvester.

mod job;
mod listing;
mod stats;

pub use job::{JobRecord, SOURCE_ID};
pub use listing::{ListingState, PageRequest, Pagination, Tier};
pub use stats::RunStats;
