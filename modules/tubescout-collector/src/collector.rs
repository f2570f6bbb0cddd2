// Collection orchestrator.
//
// One run, one browser session, four ordered stages:
//   1. search results        (critical: selector timeout fails the run)
//   2. "also watched" module (optional: absence falls through to 3)
//   3. related fallback      (only when 2 found nothing and 1 found something;
//                             once chosen, its timeout fails the run)
//   4. release the session   (always, before the final status update)
//
// Stages run sequentially on a single task; ranks come from extraction
// order, never from completion order.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use tubescout_common::{Locale, NewVideo, RawVideo, RunOutcome, RunStatus, SourceTier, PER_TIER_LIMIT};

use crate::also_watched::AlsoWatchedDetector;
use crate::browser::{BrowserPage, BrowserProvider, BrowserSession, WaitPolicy};
use crate::enrichment::EnrichmentStep;
use crate::error::{CollectorError, Result};
use crate::extractor::{
    TieredExtractor, RELATED_CARD_SELECTOR, RELATED_REGION_SELECTOR, SEARCH_CARD_SELECTOR,
};
use crate::store::RunStore;
use crate::views_parser::views_num;

const SEARCH_BASE_URL: &str = "https://www.youtube.com/results";

#[derive(Debug, Clone)]
pub struct CollectSettings {
    pub locale: Locale,
    /// Budget for every navigation and selector wait.
    pub stage_timeout: Duration,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            stage_timeout: Duration::from_secs(15),
        }
    }
}

/// What a run produced, tier by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub search: usize,
    pub people_also_watched: usize,
    pub related_fallback: usize,
    pub fallback_attempted: bool,
    pub enrichment_attempts: usize,
    pub enrichment_degraded: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub report: CollectReport,
}

/// Build the locale-qualified search URL for `keyword`.
pub fn search_url(keyword: &str, locale: &Locale) -> String {
    Url::parse_with_params(
        SEARCH_BASE_URL,
        &[
            ("search_query", keyword),
            ("hl", locale.hl.as_str()),
            ("gl", locale.gl.as_str()),
        ],
    )
    .expect("valid search base url")
    .into()
}

pub struct Collector {
    browser: Arc<dyn BrowserProvider>,
    store: Arc<dyn RunStore>,
    also_watched: Arc<dyn AlsoWatchedDetector>,
    enrichment: EnrichmentStep,
    settings: CollectSettings,
}

impl Collector {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        store: Arc<dyn RunStore>,
        also_watched: Arc<dyn AlsoWatchedDetector>,
        settings: CollectSettings,
    ) -> Self {
        Self {
            browser,
            store,
            also_watched,
            enrichment: EnrichmentStep::new(settings.stage_timeout),
            settings,
        }
    }

    /// Drive one queued run to a terminal state.
    ///
    /// Faults inside the pipeline end the run as `failed` and are reported in
    /// the summary. `Err` is returned only when the store cannot record the
    /// lifecycle itself; a failed final write carries the pipeline outcome
    /// in [`CollectorError::Unrecorded`].
    pub async fn collect(&self, run_id: Uuid, keyword: &str) -> Result<RunSummary> {
        self.store.mark_running(run_id).await?;
        info!(%run_id, keyword, "Collection started");

        let mut report = CollectReport::default();
        let outcome = match self.run_pipeline(run_id, keyword, &mut report).await {
            Ok(()) => RunOutcome::Success,
            Err(e) => {
                error!(%run_id, keyword, error = %e, "Collection failed");
                RunOutcome::Failed(failure_message(&e))
            }
        };

        if let Err(source) = self.store.finish_run(run_id, &outcome).await {
            return Err(CollectorError::Unrecorded { outcome, source });
        }
        info!(
            %run_id,
            status = %outcome.status(),
            search = report.search,
            people_also_watched = report.people_also_watched,
            related_fallback = report.related_fallback,
            "Collection finished"
        );

        Ok(RunSummary {
            run_id,
            status: outcome.status(),
            error_message: outcome.error_message().map(String::from),
            report,
        })
    }

    async fn run_pipeline(
        &self,
        run_id: Uuid,
        keyword: &str,
        report: &mut CollectReport,
    ) -> Result<()> {
        let mut session = self.browser.acquire().await?;
        let result = self.run_stages(session.as_ref(), run_id, keyword, report).await;
        session.release().await;
        result
    }

    async fn run_stages(
        &self,
        session: &dyn BrowserSession,
        run_id: Uuid,
        keyword: &str,
        report: &mut CollectReport,
    ) -> Result<()> {
        let page = session.new_page().await?;
        let page = page.as_ref();
        let timeout = self.settings.stage_timeout;

        // Stage 1: search results.
        let url = search_url(keyword, &self.settings.locale);
        info!(%run_id, url = %url, "Search stage");
        page.goto(&url, WaitPolicy::DomContentLoaded).await?;
        page.wait_for_selector(SEARCH_CARD_SELECTOR, timeout).await?;

        let cards = TieredExtractor::extract(page, SEARCH_CARD_SELECTOR, PER_TIER_LIMIT).await?;
        let search = self
            .persist_tier(page, run_id, SourceTier::Search, cards, report)
            .await?;
        report.search = search.len();

        // Stage 2: "also watched" module.
        let module = match self.also_watched.detect(page, PER_TIER_LIMIT).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!(%run_id, error = %e, "Also-watched detection failed, treating as absent");
                Vec::new()
            }
        };
        if !module.is_empty() {
            let persisted = self
                .persist_tier(page, run_id, SourceTier::PeopleAlsoWatched, module, report)
                .await?;
            report.people_also_watched = persisted.len();
            return Ok(());
        }

        // Stage 3: related videos from the first search result.
        let Some(first_url) = search.first().map(|v| v.url.clone()) else {
            info!(%run_id, "No search results, skipping related fallback");
            return Ok(());
        };
        if first_url.is_empty() {
            warn!(%run_id, "First search result has no url, skipping related fallback");
            return Ok(());
        }

        info!(%run_id, url = %first_url, "Also-watched module absent, falling back to related videos");
        report.fallback_attempted = true;
        page.goto(&first_url, WaitPolicy::DomContentLoaded).await?;
        page.wait_for_selector(RELATED_REGION_SELECTOR, timeout).await?;

        let cards = TieredExtractor::extract(page, RELATED_CARD_SELECTOR, PER_TIER_LIMIT).await?;
        let related = self
            .persist_tier(page, run_id, SourceTier::RelatedFallback, cards, report)
            .await?;
        report.related_fallback = related.len();

        Ok(())
    }

    /// Enrich and persist one tier in extraction order, ranks starting at 1.
    /// Each row is committed on its own so pollers see progress mid-run.
    async fn persist_tier(
        &self,
        page: &dyn BrowserPage,
        run_id: Uuid,
        tier: SourceTier,
        cards: Vec<RawVideo>,
        report: &mut CollectReport,
    ) -> Result<Vec<RawVideo>> {
        let mut persisted = Vec::with_capacity(cards.len().min(PER_TIER_LIMIT));

        for (i, card) in cards.into_iter().take(PER_TIER_LIMIT).enumerate() {
            let card = if card.needs_enrichment() {
                report.enrichment_attempts += 1;
                let enriched = self.enrichment.enrich(page, card).await;
                if let Some(reason) = enriched.reason() {
                    report.enrichment_degraded += 1;
                    info!(%run_id, tier = %tier, rank = i + 1, reason, "View count unavailable");
                }
                enriched.into_value()
            } else {
                card
            };

            let video = NewVideo {
                run_id,
                source_type: tier,
                rank: (i + 1) as i32,
                title: card.title.clone(),
                channel_name: card.channel.clone(),
                video_id: card.id.clone(),
                video_url: card.url.clone(),
                views_raw: card.views.clone(),
                views_num: i64::try_from(views_num(&card.views)).unwrap_or(i64::MAX),
                collected_from: tier.provenance(),
            };
            self.store.insert_video(&video).await?;
            persisted.push(card);
        }

        info!(%run_id, tier = %tier, count = persisted.len(), "Tier persisted");
        Ok(persisted)
    }
}

fn failure_message(err: &CollectorError) -> String {
    let msg = err.to_string();
    if msg.trim().is_empty() {
        "collection failed".to_string()
    } else {
        msg
    }
}
