use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::types::Locale;

/// Application configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Browser session broker
    pub browser_session_url: String,
    pub browser_session_token: Option<String>,
    pub browser_session_ttl: Duration,

    // AI templates
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: String,

    // Collection
    pub locale: Locale,
    pub stage_timeout: Duration,
    pub also_watched_selector: Option<String>,
    pub cache_ttl_hours: i64,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: normalize_database_url(
                &env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            ),
            browser_session_url: env::var("BROWSER_SESSION_URL")
                .context("BROWSER_SESSION_URL is required")?,
            browser_session_token: optional_env("BROWSER_SESSION_TOKEN"),
            browser_session_ttl: Duration::from_secs(parse_env("BROWSER_SESSION_TTL_SECS", 300)?),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            locale: Locale::new(
                env::var("YOUTUBE_HL").unwrap_or_else(|_| "id".to_string()),
                env::var("YOUTUBE_GL").unwrap_or_else(|_| "ID".to_string()),
            ),
            stage_timeout: Duration::from_secs(parse_env("STAGE_TIMEOUT_SECS", 15)?),
            also_watched_selector: optional_env("ALSO_WATCHED_SELECTOR"),
            cache_ttl_hours: parse_env("CACHE_TTL_HOURS", 24)?,
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parse_env("API_PORT", 8000)?,
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  BROWSER_SESSION_URL: {}", self.browser_session_url);
        tracing::info!("  BROWSER_SESSION_TOKEN: {}", preview_opt(&self.browser_session_token));
        tracing::info!("  OPENAI_API_KEY: {}", preview_opt(&self.openai_api_key));
        tracing::info!("  OPENAI_MODEL: {}", self.openai_model);
        tracing::info!("  locale: hl={} gl={}", self.locale.hl, self.locale.gl);
        tracing::info!("  stage timeout: {}s", self.stage_timeout.as_secs());
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Accept the legacy `postgres://` scheme alongside `postgresql://`.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}
