// Postgres run store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use tubescout_common::{
    Locale, NewTemplate, NewVideo, Run, RunOutcome, RunStatus, Template, Video,
};

use super::{RunStore, StoreResult};
use crate::error::StoreError;

pub struct PgRunStore {
    pool: PgPool,
}

/// A row from the runs table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    keyword: String,
    hl: String,
    gl: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            id: row.id,
            keyword: row.keyword,
            hl: row.hl,
            gl: row.gl,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("run {}: {e}", row.id)))?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            error_message: row.error_message,
        })
    }
}

/// A row from the videos table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct VideoRow {
    id: Uuid,
    run_id: Uuid,
    source_type: String,
    rank: i32,
    title: String,
    channel_name: String,
    video_id: String,
    video_url: String,
    views_raw: String,
    views_num: i64,
    published_raw: Option<String>,
    duration_raw: Option<String>,
    collected_from: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VideoRow> for Video {
    type Error = StoreError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let corrupt = |e: tubescout_common::TubescoutError| {
            StoreError::Corrupt(format!("video {}: {e}", row.id))
        };
        Ok(Video {
            id: row.id,
            run_id: row.run_id,
            source_type: row.source_type.parse().map_err(corrupt)?,
            rank: row.rank,
            title: row.title,
            channel_name: row.channel_name,
            video_id: row.video_id,
            video_url: row.video_url,
            views_raw: row.views_raw,
            views_num: row.views_num,
            published_raw: row.published_raw,
            duration_raw: row.duration_raw,
            collected_from: row.collected_from.parse().map_err(corrupt)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    run_id: Uuid,
    template_text: String,
    example_1: Option<String>,
    example_2: Option<String>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: row.id,
            run_id: row.run_id,
            template_text: row.template_text,
            example_1: row.example_1,
            example_2: row.example_2,
        }
    }
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Apply a status change under a row lock, enforcing the run lifecycle.
    async fn transition(
        &self,
        run_id: Uuid,
        next: RunStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM runs WHERE id = $1 FOR UPDATE")
                .bind(run_id)
                .fetch_optional(&mut *tx)
                .await?;

        let current: RunStatus = current
            .ok_or(StoreError::RunNotFound(run_id))?
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("run {run_id}: {e}")))?;

        if !current.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        sqlx::query(
            r#"
            UPDATE runs
            SET status = $2,
                finished_at = CASE WHEN $3 THEN now() ELSE NULL END,
                error_message = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(next.as_str())
        .bind(next.is_terminal())
        .bind(error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%run_id, from = %current, to = %next, "Run transitioned");
        Ok(())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_run(&self, keyword: &str, locale: &Locale) -> StoreResult<Run> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            INSERT INTO runs (keyword, hl, gl, status)
            VALUES ($1, $2, $3, 'queued')
            RETURNING *
            "#,
        )
        .bind(keyword)
        .bind(&locale.hl)
        .bind(&locale.gl)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn mark_running(&self, run_id: Uuid) -> StoreResult<()> {
        self.transition(run_id, RunStatus::Running, None).await
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()> {
        self.transition(run_id, outcome.status(), outcome.error_message())
            .await
    }

    async fn insert_video(&self, v: &NewVideo) -> StoreResult<Video> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            INSERT INTO videos
                (run_id, source_type, rank, title, channel_name, video_id,
                 video_url, views_raw, views_num, collected_from)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(v.run_id)
        .bind(v.source_type.as_str())
        .bind(v.rank)
        .bind(&v.title)
        .bind(&v.channel_name)
        .bind(&v.video_id)
        .bind(&v.video_url)
        .bind(&v.views_raw)
        .bind(v.views_num)
        .bind(v.collected_from.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Run::try_from).transpose()
    }

    async fn list_videos(&self, run_id: Uuid) -> StoreResult<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT * FROM videos
            WHERE run_id = $1
            ORDER BY
                CASE source_type
                    WHEN 'search' THEN 0
                    WHEN 'people_also_watched' THEN 1
                    ELSE 2
                END,
                rank ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Video::try_from).collect()
    }

    async fn insert_templates(&self, run_id: Uuid, templates: &[NewTemplate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for t in templates {
            sqlx::query(
                r#"
                INSERT INTO templates (run_id, template_text, example_1, example_2)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(run_id)
            .bind(&t.template_text)
            .bind(&t.example_1)
            .bind(&t.example_2)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_templates(&self, run_id: Uuid) -> StoreResult<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM templates WHERE run_id = $1 ORDER BY created_at",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Template::from).collect())
    }

    async fn latest_fresh_success(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT * FROM runs
            WHERE keyword = $1
              AND status = 'success'
              AND finished_at >= $2
            ORDER BY finished_at DESC
            LIMIT 1
            "#,
        )
        .bind(keyword)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Run::try_from).transpose()
    }
}
