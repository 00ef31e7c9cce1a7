//! Listing page fetch tiers, state extraction and record shaping.

pub mod browser;
pub mod http_client;
pub mod shaper;
pub mod state;
pub mod tier;

pub use browser::{BrowserEngineConfig, BrowserTier};
pub use http_client::{classify_response, HttpTier, Pacer, ResponseClass};
pub use shaper::{shape_entry, shape_items};
pub use state::{balanced_object, extract_listing_state};
pub use tier::{BlockReason, PageOutcome, PageSource};
