//! Error types for the harvester.

use thiserror::Error;

/// Errors that can end a harvest run.
///
/// Fetch and parse problems are normally absorbed by the tiers and turned
/// into a [`PageOutcome`](crate::scrapers::PageOutcome); only the variants
/// that break output integrity or the host runtime reach the caller.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        HarvestError::Fetch(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
