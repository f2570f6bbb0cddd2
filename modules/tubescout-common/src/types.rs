use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TubescoutError;

/// Hard cap on videos collected per tier.
pub const PER_TIER_LIMIT: usize = 2;

// --- Locale ---

/// Interface language (`hl`) and region (`gl`) pair, fixed per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub hl: String,
    pub gl: String,
}

impl Locale {
    pub fn new(hl: impl Into<String>, gl: impl Into<String>) -> Self {
        Self {
            hl: hl.into(),
            gl: gl.into(),
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("id", "ID")
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    /// Reserved for consumers that report incomplete runs. The collector
    /// itself only ever finishes a run as `Success` or `Failed`.
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Partial | RunStatus::Failed
        )
    }

    /// queued -> running -> {success, partial, failed}. A queued run may also
    /// fail outright when orchestration never got to start.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Queued, RunStatus::Running) => true,
            (RunStatus::Queued, RunStatus::Failed) => true,
            (RunStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = TubescoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(TubescoutError::UnknownVariant {
                kind: "run status",
                value: other.to_string(),
            }),
        }
    }
}

/// Which of the three sources a video was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Search,
    PeopleAlsoWatched,
    RelatedFallback,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Search => "search",
            SourceTier::PeopleAlsoWatched => "people_also_watched",
            SourceTier::RelatedFallback => "related_fallback",
        }
    }

    /// The page type each tier is read from.
    pub fn provenance(&self) -> Provenance {
        match self {
            SourceTier::Search => Provenance::Search,
            SourceTier::PeopleAlsoWatched => Provenance::Module,
            SourceTier::RelatedFallback => Provenance::WatchPage,
        }
    }
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTier {
    type Err = TubescoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(SourceTier::Search),
            "people_also_watched" => Ok(SourceTier::PeopleAlsoWatched),
            "related_fallback" => Ok(SourceTier::RelatedFallback),
            other => Err(TubescoutError::UnknownVariant {
                kind: "source tier",
                value: other.to_string(),
            }),
        }
    }
}

/// Which page type produced a video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Search,
    Module,
    WatchPage,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Search => "search",
            Provenance::Module => "module",
            Provenance::WatchPage => "watch_page",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = TubescoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Provenance::Search),
            "module" => Ok(Provenance::Module),
            "watch_page" => Ok(Provenance::WatchPage),
            other => Err(TubescoutError::UnknownVariant {
                kind: "provenance",
                value: other.to_string(),
            }),
        }
    }
}

// --- Run ---

/// One keyword's collection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub keyword: String,
    pub hl: String,
    pub gl: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// How the orchestrator closes a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed(String),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Success => RunStatus::Success,
            RunOutcome::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::Failed(msg) => Some(msg),
        }
    }
}

// --- Video ---

/// A video card as read off a page, before ranking and parsing.
/// Every field is tolerant: a missing element becomes an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVideo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub views: String,
}

impl RawVideo {
    pub fn needs_enrichment(&self) -> bool {
        self.views.trim().is_empty()
    }
}

/// A persisted video row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub run_id: Uuid,
    pub source_type: SourceTier,
    pub rank: i32,
    pub title: String,
    pub channel_name: String,
    pub video_id: String,
    pub video_url: String,
    pub views_raw: String,
    pub views_num: i64,
    pub published_raw: Option<String>,
    pub duration_raw: Option<String>,
    pub collected_from: Provenance,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a video row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub run_id: Uuid,
    pub source_type: SourceTier,
    pub rank: i32,
    pub title: String,
    pub channel_name: String,
    pub video_id: String,
    pub video_url: String,
    pub views_raw: String,
    pub views_num: i64,
    pub collected_from: Provenance,
}

// --- Template ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub run_id: Uuid,
    pub template_text: String,
    pub example_1: Option<String>,
    pub example_2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub template_text: String,
    #[serde(default)]
    pub example_1: Option<String>,
    #[serde(default)]
    pub example_2: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Partial,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("done".parse::<RunStatus>().is_err());
    }

    #[test]
    fn transitions_follow_lifecycle() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Success));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Success));
        assert!(!RunStatus::Success.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn tier_maps_to_provenance() {
        assert_eq!(SourceTier::Search.provenance(), Provenance::Search);
        assert_eq!(SourceTier::PeopleAlsoWatched.provenance(), Provenance::Module);
        assert_eq!(SourceTier::RelatedFallback.provenance(), Provenance::WatchPage);
    }

    #[test]
    fn raw_video_tolerates_missing_fields() {
        let v: RawVideo = serde_json::from_str(r#"{"title":"A","url":"u"}"#).unwrap();
        assert_eq!(v.channel, "");
        assert!(v.needs_enrichment());
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(SourceTier::PeopleAlsoWatched).unwrap(),
            "people_also_watched"
        );
        assert_eq!(serde_json::to_value(Provenance::WatchPage).unwrap(), "watch_page");
    }
}
