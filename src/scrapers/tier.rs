//! Common contract of the two fetch tiers.

use async_trait::async_trait;

use crate::models::{ListingState, PageRequest, Tier};

/// Why a response was judged unusable without being an outright failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// HTTP 403.
    Forbidden,
    /// Body carries an anti-bot marker.
    DeniedMarker(&'static str),
    /// Body shorter than the configured minimum.
    ShortBody(usize),
    /// Response looked fine but carried no result-list state.
    MissingState,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden => write!(f, "HTTP 403"),
            Self::DeniedMarker(marker) => write!(f, "body contains '{}'", marker),
            Self::ShortBody(len) => write!(f, "body too short ({} bytes)", len),
            Self::MissingState => write!(f, "no embedded result-list state"),
        }
    }
}

/// Result of loading one listing page on one tier.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Parsed(ListingState),
    Blocked(BlockReason),
    /// Retries exhausted on transport errors, timeouts or unexpected statuses.
    Failed(String),
}

impl PageOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

/// A fetch tier: turns a page request into a listing state.
///
/// Implementations own their retry policy and never return an error; every
/// problem is folded into [`PageOutcome`].
#[async_trait]
pub trait PageSource: Send + Sync {
    fn tier(&self) -> Tier;

    /// Maximum number of concurrent loads the tier accepts.
    fn concurrency(&self) -> usize {
        1
    }

    async fn load(&self, request: &PageRequest) -> PageOutcome;

    /// Release long-lived resources (browser processes, pooled sessions).
    async fn shutdown(&self) {}
}
