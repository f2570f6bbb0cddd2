//! Detectors for the "people also watched" module on a search results page.
//!
//! The host page exposes no stable selector for this module, so the
//! default detector reports nothing and the collector falls through to the
//! related-video fallback. Deployments that know a working selector can
//! plug in [`SelectorAlsoWatched`].

use async_trait::async_trait;

use tubescout_common::RawVideo;

use crate::browser::{BrowserPage, BrowserResult};
use crate::extractor::TieredExtractor;

#[async_trait]
pub trait AlsoWatchedDetector: Send + Sync {
    /// Return up to `limit` module cards from the current page.
    async fn detect(&self, page: &dyn BrowserPage, limit: usize) -> BrowserResult<Vec<RawVideo>>;
}

/// Always finds nothing.
pub struct NoAlsoWatched;

#[async_trait]
impl AlsoWatchedDetector for NoAlsoWatched {
    async fn detect(&self, _page: &dyn BrowserPage, _limit: usize) -> BrowserResult<Vec<RawVideo>> {
        Ok(Vec::new())
    }
}

/// Extracts module cards with an operator-supplied selector.
pub struct SelectorAlsoWatched {
    selector: String,
}

impl SelectorAlsoWatched {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

#[async_trait]
impl AlsoWatchedDetector for SelectorAlsoWatched {
    async fn detect(&self, page: &dyn BrowserPage, limit: usize) -> BrowserResult<Vec<RawVideo>> {
        TieredExtractor::extract(page, &self.selector, limit).await
    }
}
