//! Shared utility functions.
//!
//! - `url`: search URL construction and href resolution
//! - `dates`: posted-date parsing and the recency filter
//! - `html`: snippet cleanup

pub mod dates;
pub mod html;
pub mod url;

pub use dates::RecencyWindow;
pub use html::clean_snippet;
