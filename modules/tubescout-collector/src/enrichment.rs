//! Best-effort view-count lookup on a video's own watch page.

use std::time::Duration;

use tracing::{debug, warn};

use tubescout_common::{Degradable, RawVideo};

use crate::browser::{BrowserPage, BrowserResult, WaitPolicy};

/// Candidate view-count locations on a watch page, tried in order.
pub const WATCH_VIEWS_SELECTORS: [&str; 2] = ["#info-text span:first-child", ".view-count"];

pub const WATCH_VIEWS_SCRIPT: &str = r#"() => {
    const el = document.querySelector('#info-text span:first-child') || document.querySelector('.view-count');
    return el ? el.innerText.trim() : '';
}"#;

pub struct EnrichmentStep {
    timeout: Duration,
}

impl EnrichmentStep {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Fill in `video.views` from its watch page if it is empty.
    ///
    /// The lookup runs in a separate tab that is closed on every path. Any
    /// failure hands back the record unchanged as `Degraded`. A record that
    /// already has view text is returned as-is without touching the browser.
    pub async fn enrich(&self, page: &dyn BrowserPage, video: RawVideo) -> Degradable<RawVideo> {
        if !video.needs_enrichment() {
            return Degradable::Ok(video);
        }
        if video.url.is_empty() {
            return Degradable::degraded(video, "no url to enrich from");
        }

        let mut tab = match page.new_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                warn!(url = %video.url, error = %e, "Enrichment: could not open tab");
                return Degradable::degraded(video, e.to_string());
            }
        };

        let lookup = self.lookup_views(tab.as_ref(), &video.url).await;

        if let Err(e) = tab.close().await {
            debug!(url = %video.url, error = %e, "Enrichment: error closing tab");
        }

        match lookup {
            Ok(views) if !views.is_empty() => {
                debug!(url = %video.url, views = %views, "Enrichment filled view count");
                Degradable::Ok(RawVideo { views, ..video })
            }
            Ok(_) => Degradable::degraded(video, "watch page has no view count"),
            Err(e) => {
                warn!(url = %video.url, error = %e, "Enrichment failed");
                Degradable::degraded(video, e.to_string())
            }
        }
    }

    async fn lookup_views(&self, tab: &dyn BrowserPage, url: &str) -> BrowserResult<String> {
        tab.goto(url, WaitPolicy::DomContentLoaded).await?;
        tab.wait_for_selector(&WATCH_VIEWS_SELECTORS.join(", "), self.timeout)
            .await?;
        let value = tab.evaluate(WATCH_VIEWS_SCRIPT).await?;
        Ok(value.as_str().map(|s| s.trim().to_string()).unwrap_or_default())
    }
}
