// Job submission and status reads for the surrounding application.
//
// submit_job creates the run record before it schedules anything, so a
// caller always gets back an id it can poll. The collection itself runs on
// a spawned tokio task with its own browser session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use tubescout_common::{Locale, RunOutcome, RunStatus, SourceTier, Template, Video};

use crate::collector::Collector;
use crate::error::{CollectorError, Result};
use crate::store::RunStore;
use crate::templates::TitleTemplater;

#[derive(Debug)]
pub struct Submission {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// True when a fresh successful run was reused instead of scheduling one.
    pub cached: bool,
    /// The background collection task, when one was scheduled.
    pub task: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub source: SourceTier,
    pub rank: i32,
    pub title: String,
    pub channel_name: String,
    pub video_id: String,
    pub video_url: String,
    pub views_raw: String,
    pub views_num: i64,
    pub collected_from: tubescout_common::Provenance,
}

impl From<&Video> for VideoSummary {
    fn from(v: &Video) -> Self {
        Self {
            source: v.source_type,
            rank: v.rank,
            title: v.title.clone(),
            channel_name: v.channel_name.clone(),
            video_id: v.video_id.clone(),
            video_url: v.video_url.clone(),
            views_raw: v.views_raw.clone(),
            views_num: v.views_num,
            collected_from: v.collected_from,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub template_text: String,
    pub example_1: Option<String>,
    pub example_2: Option<String>,
}

impl From<&Template> for TemplateSummary {
    fn from(t: &Template) -> Self {
        Self {
            template_text: t.template_text.clone(),
            example_1: t.example_1.clone(),
            example_2: t.example_2.clone(),
        }
    }
}

/// A run with its videos grouped by tier, each group rank-ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub job_id: Uuid,
    pub keyword: String,
    pub status: RunStatus,
    pub hl: String,
    pub gl: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub search_top: Vec<VideoSummary>,
    pub people_also_watched_top: Vec<VideoSummary>,
    pub related_fallback_top: Vec<VideoSummary>,
    pub templates: Vec<TemplateSummary>,
    pub error_message: Option<String>,
}

pub struct JobRunner {
    collector: Arc<Collector>,
    store: Arc<dyn RunStore>,
    templater: Option<Arc<dyn TitleTemplater>>,
    locale: Locale,
    cache_ttl: chrono::Duration,
}

impl JobRunner {
    pub fn new(
        collector: Arc<Collector>,
        store: Arc<dyn RunStore>,
        templater: Option<Arc<dyn TitleTemplater>>,
        locale: Locale,
        cache_ttl: chrono::Duration,
    ) -> Self {
        Self {
            collector,
            store,
            templater,
            locale,
            cache_ttl,
        }
    }

    /// Reuse a fresh successful run for `keyword`, or create and schedule a
    /// new one. `force_refresh` always schedules.
    pub async fn submit_job(&self, keyword: &str, force_refresh: bool) -> Result<Submission> {
        if keyword.trim().is_empty() {
            return Err(CollectorError::InvalidInput("keyword must not be blank".to_string()));
        }

        if !force_refresh {
            let since = Utc::now() - self.cache_ttl;
            if let Some(run) = self.store.latest_fresh_success(keyword, since).await? {
                info!(run_id = %run.id, keyword, "Serving cached run");
                return Ok(Submission {
                    run_id: run.id,
                    status: run.status,
                    cached: true,
                    task: None,
                });
            }
        }

        let run = self.store.create_run(keyword, &self.locale).await?;
        info!(run_id = %run.id, keyword, force_refresh, "Run queued");

        let task = tokio::spawn(process_run(
            self.collector.clone(),
            self.store.clone(),
            self.templater.clone(),
            run.id,
            keyword.to_string(),
        ));

        Ok(Submission {
            run_id: run.id,
            status: run.status,
            cached: false,
            task: Some(task),
        })
    }

    /// Current state of a run. Videos persisted so far are included even
    /// while the run is still going.
    pub async fn run_status(&self, run_id: Uuid) -> Result<Option<RunReport>> {
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(None);
        };

        let videos = self.store.list_videos(run_id).await?;
        let templates = self.store.list_templates(run_id).await?;

        let tier = |tier: SourceTier| {
            let mut group: Vec<VideoSummary> = videos
                .iter()
                .filter(|v| v.source_type == tier)
                .map(VideoSummary::from)
                .collect();
            group.sort_by_key(|v| v.rank);
            group
        };

        Ok(Some(RunReport {
            job_id: run.id,
            keyword: run.keyword.clone(),
            status: run.status,
            hl: run.hl.clone(),
            gl: run.gl.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            search_top: tier(SourceTier::Search),
            people_also_watched_top: tier(SourceTier::PeopleAlsoWatched),
            related_fallback_top: tier(SourceTier::RelatedFallback),
            templates: templates.iter().map(TemplateSummary::from).collect(),
            error_message: run.error_message,
        }))
    }
}

async fn process_run(
    collector: Arc<Collector>,
    store: Arc<dyn RunStore>,
    templater: Option<Arc<dyn TitleTemplater>>,
    run_id: Uuid,
    keyword: String,
) {
    let summary = match collector.collect(run_id, &keyword).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(%run_id, error = %e, "Run lifecycle could not be recorded");
            let outcome = match e {
                CollectorError::Unrecorded { outcome, .. } => outcome,
                other => RunOutcome::Failed(other.to_string()),
            };
            if let Err(e) = store.finish_run(run_id, &outcome).await {
                warn!(%run_id, error = %e, "Could not record run outcome");
            }
            return;
        }
    };

    if summary.status != RunStatus::Success {
        return;
    }
    let Some(templater) = templater else {
        return;
    };

    if let Err(e) = generate_templates(templater.as_ref(), store.as_ref(), run_id).await {
        warn!(%run_id, error = %e, "Template generation failed");
    }
}

async fn generate_templates(
    templater: &dyn TitleTemplater,
    store: &dyn RunStore,
    run_id: Uuid,
) -> anyhow::Result<()> {
    let titles: Vec<String> = store
        .list_videos(run_id)
        .await?
        .into_iter()
        .map(|v| v.title)
        .collect();

    if titles.is_empty() {
        return Ok(());
    }

    let templates = templater.generate(&titles).await?;
    store.insert_templates(run_id, &templates).await?;
    info!(%run_id, count = templates.len(), "Templates stored");
    Ok(())
}
