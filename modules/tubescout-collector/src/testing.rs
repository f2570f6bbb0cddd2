// Test mocks for the collection pipeline.
//
// Mocks for the trait boundaries:
// - MockBrowser (BrowserProvider) scripted pages keyed by URL
// - MockRunStore (RunStore) in-memory runs, videos, templates
// - FixedAlsoWatched (AlsoWatchedDetector) canned module cards
// - MockTemplater (TitleTemplater) canned templates
//
// Plus helpers for building card JSON.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use tubescout_common::{
    Locale, NewTemplate, NewVideo, RawVideo, Run, RunOutcome, RunStatus, Template, Video,
};

use crate::also_watched::AlsoWatchedDetector;
use crate::browser::{BrowserPage, BrowserProvider, BrowserResult, BrowserSession, WaitPolicy};
use crate::enrichment::{WATCH_VIEWS_SCRIPT, WATCH_VIEWS_SELECTORS};
use crate::error::{BrowserError, StoreError};
use crate::store::{RunStore, StoreResult};
use crate::templates::TitleTemplater;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// A card as the projection script would return it.
pub fn card(title: &str, id: &str, channel: &str, views: &str) -> Value {
    json!({
        "title": title,
        "url": watch_url(id),
        "channel": channel,
        "views": views,
    })
}

// ---------------------------------------------------------------------------
// MockBrowser
// ---------------------------------------------------------------------------

/// What a scripted URL looks like once loaded.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    selectors: HashSet<String>,
    cards: HashMap<String, Vec<Value>>,
    views: Option<String>,
    fail_goto: bool,
    fail_evaluate: bool,
    gate: Option<Arc<Notify>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cards returned for `selector`. Also makes the selector present.
    pub fn with_cards(mut self, selector: &str, cards: Vec<Value>) -> Self {
        self.selectors.insert(selector.to_string());
        self.cards.insert(selector.to_string(), cards);
        self
    }

    /// Make `selector` present without any cards under it.
    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selectors.insert(selector.to_string());
        self
    }

    /// View text shown on this page when treated as a watch page.
    pub fn with_views(mut self, views: &str) -> Self {
        self.selectors.insert(WATCH_VIEWS_SELECTORS.join(", "));
        self.views = Some(views.to_string());
        self
    }

    pub fn failing_goto(mut self) -> Self {
        self.fail_goto = true;
        self
    }

    pub fn failing_evaluate(mut self) -> Self {
        self.fail_evaluate = true;
        self
    }

    /// Hold navigation to this page until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Shared counters so tests can assert on resource handling.
#[derive(Debug, Default)]
pub struct BrowserStats {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub tabs_opened: AtomicUsize,
    pub tabs_closed: AtomicUsize,
    visits: Mutex<Vec<String>>,
}

impl BrowserStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn tabs_opened(&self) -> usize {
        self.tabs_opened.load(Ordering::SeqCst)
    }

    pub fn tabs_closed(&self) -> usize {
        self.tabs_closed.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order, across all pages and tabs.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

/// URL-keyed scripted browser. Unregistered URLs load as empty pages.
/// Builder pattern: `.on_page()`, `.failing_acquire()`.
#[derive(Clone, Default)]
pub struct MockBrowser {
    pages: Arc<HashMap<String, MockPage>>,
    fail_acquire: bool,
    stats: Arc<BrowserStats>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, page: MockPage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), page);
        self
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn stats(&self) -> Arc<BrowserStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserProvider for MockBrowser {
    async fn acquire(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        if self.fail_acquire {
            return Err(BrowserError::Provisioning(
                "MockBrowser: acquire refused".to_string(),
            ));
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            pages: self.pages.clone(),
            stats: self.stats.clone(),
            released: false,
        }))
    }
}

pub struct MockSession {
    pages: Arc<HashMap<String, MockPage>>,
    stats: Arc<BrowserStats>,
    released: bool,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        if self.released {
            return Err(BrowserError::Cdp("MockSession: already released".to_string()));
        }
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTab::new(self.pages.clone(), self.stats.clone(), false)))
    }

    async fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct MockTab {
    pages: Arc<HashMap<String, MockPage>>,
    stats: Arc<BrowserStats>,
    current: Mutex<MockPage>,
    is_tab: bool,
    closed: bool,
}

impl MockTab {
    fn new(pages: Arc<HashMap<String, MockPage>>, stats: Arc<BrowserStats>, is_tab: bool) -> Self {
        Self {
            pages,
            stats,
            current: Mutex::new(MockPage::default()),
            is_tab,
            closed: false,
        }
    }
}

/// Pull the selector literal out of a projection script.
fn script_selector(script: &str) -> Option<String> {
    let start = script.find("querySelectorAll(")? + "querySelectorAll(".len();
    serde_json::Deserializer::from_str(&script[start..])
        .into_iter::<String>()
        .next()?
        .ok()
}

#[async_trait]
impl BrowserPage for MockTab {
    async fn goto(&self, url: &str, _wait: WaitPolicy) -> BrowserResult<()> {
        self.stats.visits.lock().unwrap().push(url.to_string());
        let page = self.pages.get(url).cloned().unwrap_or_default();
        if let Some(gate) = &page.gate {
            gate.notified().await;
        }
        if page.fail_goto {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "MockBrowser: navigation refused".to_string(),
            });
        }
        *self.current.lock().unwrap() = page;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        if self.current.lock().unwrap().selectors.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                what: selector.to_string(),
                timeout,
            })
        }
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        let page = self.current.lock().unwrap().clone();
        if page.fail_evaluate {
            return Err(BrowserError::Script("MockBrowser: evaluation failed".to_string()));
        }
        if script == WATCH_VIEWS_SCRIPT {
            return Ok(Value::String(page.views.unwrap_or_default()));
        }
        let cards = script_selector(script)
            .and_then(|selector| page.cards.get(&selector).cloned())
            .unwrap_or_default();
        Ok(Value::Array(cards))
    }

    async fn new_tab(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        self.stats.tabs_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTab::new(self.pages.clone(), self.stats.clone(), true)))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if !self.closed {
            self.closed = true;
            if self.is_tab {
                self.stats.tabs_closed.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockRunStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockRunStoreInner {
    runs: HashMap<Uuid, Run>,
    videos: Vec<Video>,
    templates: Vec<Template>,
}

/// In-memory store that enforces the run lifecycle like the real one.
#[derive(Default)]
pub struct MockRunStore {
    inner: Mutex<MockRunStoreInner>,
    fail_video_inserts_after: Option<usize>,
    failing_finishes: AtomicUsize,
}

impl MockRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` video inserts, then fail every one after.
    pub fn failing_video_inserts_after(mut self, n: usize) -> Self {
        self.fail_video_inserts_after = Some(n);
        self
    }

    pub fn failing_finish(self) -> Self {
        self.failing_finishes(usize::MAX)
    }

    /// Refuse the next `n` finish writes, then accept them again.
    pub fn failing_finishes(mut self, n: usize) -> Self {
        self.failing_finishes = AtomicUsize::new(n);
        self
    }

    /// Seed a finished run, e.g. to exercise the freshness cache.
    pub fn seed_run(&self, keyword: &str, status: RunStatus, finished_at: DateTime<Utc>) -> Uuid {
        let locale = Locale::default();
        let run = Run {
            id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            hl: locale.hl,
            gl: locale.gl,
            status,
            started_at: finished_at,
            finished_at: status.is_terminal().then_some(finished_at),
            error_message: None,
        };
        let id = run.id;
        self.inner.lock().unwrap().runs.insert(id, run);
        id
    }

    pub fn run(&self, run_id: Uuid) -> Option<Run> {
        self.inner.lock().unwrap().runs.get(&run_id).cloned()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.inner.lock().unwrap().runs.values().cloned().collect()
    }

    /// Videos in insertion order.
    pub fn videos(&self, run_id: Uuid) -> Vec<Video> {
        self.inner
            .lock()
            .unwrap()
            .videos
            .iter()
            .filter(|v| v.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn templates(&self, run_id: Uuid) -> Vec<Template> {
        self.inner
            .lock()
            .unwrap()
            .templates
            .iter()
            .filter(|t| t.run_id == run_id)
            .cloned()
            .collect()
    }

    fn transition(
        &self,
        run_id: Uuid,
        next: RunStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;
        if !run.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: run.status,
                to: next,
            });
        }
        run.status = next;
        run.finished_at = next.is_terminal().then(Utc::now);
        run.error_message = error_message.map(String::from);
        Ok(())
    }
}

#[async_trait]
impl RunStore for MockRunStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_run(&self, keyword: &str, locale: &Locale) -> StoreResult<Run> {
        let run = Run {
            id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            hl: locale.hl.clone(),
            gl: locale.gl.clone(),
            status: RunStatus::Queued,
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
        };
        self.inner.lock().unwrap().runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn mark_running(&self, run_id: Uuid) -> StoreResult<()> {
        self.transition(run_id, RunStatus::Running, None)
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()> {
        let refused = self
            .failing_finishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StoreError::Unavailable(
                "MockRunStore: finish refused".to_string(),
            ));
        }
        self.transition(run_id, outcome.status(), outcome.error_message())
    }

    async fn insert_video(&self, v: &NewVideo) -> StoreResult<Video> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(limit) = self.fail_video_inserts_after {
            if inner.videos.len() >= limit {
                return Err(StoreError::Unavailable(
                    "MockRunStore: video insert refused".to_string(),
                ));
            }
        }
        if !inner.runs.contains_key(&v.run_id) {
            return Err(StoreError::RunNotFound(v.run_id));
        }
        let duplicate = inner
            .videos
            .iter()
            .any(|e| e.run_id == v.run_id && e.source_type == v.source_type && e.rank == v.rank);
        if duplicate {
            return Err(StoreError::Unavailable(format!(
                "MockRunStore: duplicate rank {} for {}",
                v.rank, v.source_type
            )));
        }

        let video = Video {
            id: Uuid::new_v4(),
            run_id: v.run_id,
            source_type: v.source_type,
            rank: v.rank,
            title: v.title.clone(),
            channel_name: v.channel_name.clone(),
            video_id: v.video_id.clone(),
            video_url: v.video_url.clone(),
            views_raw: v.views_raw.clone(),
            views_num: v.views_num,
            published_raw: None,
            duration_raw: None,
            collected_from: v.collected_from,
            created_at: Utc::now(),
        };
        inner.videos.push(video.clone());
        Ok(video)
    }

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
        Ok(self.run(run_id))
    }

    async fn list_videos(&self, run_id: Uuid) -> StoreResult<Vec<Video>> {
        let mut videos = self.videos(run_id);
        videos.sort_by_key(|v| (v.source_type as u8, v.rank));
        Ok(videos)
    }

    async fn insert_templates(&self, run_id: Uuid, templates: &[NewTemplate]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for t in templates {
            inner.templates.push(Template {
                id: Uuid::new_v4(),
                run_id,
                template_text: t.template_text.clone(),
                example_1: t.example_1.clone(),
                example_2: t.example_2.clone(),
            });
        }
        Ok(())
    }

    async fn list_templates(&self, run_id: Uuid) -> StoreResult<Vec<Template>> {
        Ok(self.templates(run_id))
    }

    async fn latest_fresh_success(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Run>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .runs
            .values()
            .filter(|r| r.keyword == keyword && r.status == RunStatus::Success)
            .filter(|r| r.finished_at.is_some_and(|f| f >= since))
            .max_by_key(|r| r.finished_at)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// FixedAlsoWatched / MockTemplater
// ---------------------------------------------------------------------------

/// Detector with a canned answer.
pub struct FixedAlsoWatched {
    result: Result<Vec<RawVideo>, String>,
}

impl FixedAlsoWatched {
    pub fn new(cards: Vec<RawVideo>) -> Self {
        Self { result: Ok(cards) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl AlsoWatchedDetector for FixedAlsoWatched {
    async fn detect(&self, _page: &dyn BrowserPage, limit: usize) -> BrowserResult<Vec<RawVideo>> {
        match &self.result {
            Ok(cards) => Ok(cards.iter().take(limit).cloned().collect()),
            Err(message) => Err(BrowserError::Script(message.clone())),
        }
    }
}

/// Templater that returns fixed templates and records the titles it saw.
#[derive(Default)]
pub struct MockTemplater {
    templates: Vec<NewTemplate>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl MockTemplater {
    pub fn new(templates: Vec<NewTemplate>) -> Self {
        Self {
            templates,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TitleTemplater for MockTemplater {
    async fn generate(&self, titles: &[String]) -> anyhow::Result<Vec<NewTemplate>> {
        self.seen.lock().unwrap().push(titles.to_vec());
        Ok(self.templates.clone())
    }
}
