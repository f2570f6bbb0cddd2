// Run persistence behind one trait.
//
// The collector only needs create/update semantics on runs plus append-only
// video rows. PgRunStore is the Postgres implementation; testing::MockRunStore
// keeps everything in memory.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tubescout_common::{Locale, NewTemplate, NewVideo, Run, RunOutcome, Template, Video};

use crate::error::StoreError;

pub use postgres::PgRunStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Round-trip to the backing store, for health checks.
    async fn ping(&self) -> StoreResult<()>;

    /// Create a run in `queued`.
    async fn create_run(&self, keyword: &str, locale: &Locale) -> StoreResult<Run>;

    /// queued -> running.
    async fn mark_running(&self, run_id: Uuid) -> StoreResult<()>;

    /// Move a run to its terminal state and stamp `finished_at`.
    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()>;

    /// Insert and commit a single video row.
    async fn insert_video(&self, video: &NewVideo) -> StoreResult<Video>;

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>>;

    /// All videos of a run, ordered by tier then rank.
    async fn list_videos(&self, run_id: Uuid) -> StoreResult<Vec<Video>>;

    async fn insert_templates(&self, run_id: Uuid, templates: &[NewTemplate]) -> StoreResult<()>;

    async fn list_templates(&self, run_id: Uuid) -> StoreResult<Vec<Template>>;

    /// Newest successful run for `keyword` finished at or after `since`.
    async fn latest_fresh_success(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Run>>;
}
