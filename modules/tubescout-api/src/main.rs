use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use browser_session_client::BrowserSessionClient;
use tubescout_collector::{
    AlsoWatchedDetector, CdpBrowserProvider, CollectSettings, Collector, JobRunner, NoAlsoWatched,
    OpenAiTemplater, PgRunStore, RunStore, SelectorAlsoWatched, TitleTemplater,
};
use tubescout_common::Config;

mod rest;

pub struct AppState {
    pub runner: JobRunner,
    pub store: Arc<dyn RunStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(rest::health))
        .route("/health", get(rest::health))
        // Collection jobs
        .route("/api/collect/youtube", post(rest::api_collect_youtube))
        .route("/api/status/{job_id}", get(rest::api_status))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

fn build_templater(config: &Config) -> Option<Arc<dyn TitleTemplater>> {
    let Some(api_key) = config.openai_api_key.as_deref() else {
        warn!("OPENAI_API_KEY not set, template generation disabled");
        return None;
    };

    let mut ai = OpenAi::new(api_key, &config.openai_model);
    if let Some(base_url) = &config.openai_base_url {
        ai = ai.with_base_url(base_url);
    }
    Some(Arc::new(OpenAiTemplater::new(ai)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tubescout=info".parse()?))
        .init();

    let config = Config::from_env()?;

    let store = PgRunStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store: Arc<dyn RunStore> = Arc::new(store);

    let sessions = BrowserSessionClient::new(
        &config.browser_session_url,
        config.browser_session_token.as_deref(),
    )?;
    let browser = CdpBrowserProvider::new(
        sessions,
        config.browser_session_ttl,
        config.stage_timeout,
    );

    let also_watched: Arc<dyn AlsoWatchedDetector> = match &config.also_watched_selector {
        Some(selector) => {
            info!(selector = %selector, "Using configured also-watched selector");
            Arc::new(SelectorAlsoWatched::new(selector.clone()))
        }
        None => Arc::new(NoAlsoWatched),
    };

    let collector = Collector::new(
        Arc::new(browser),
        store.clone(),
        also_watched,
        CollectSettings {
            locale: config.locale.clone(),
            stage_timeout: config.stage_timeout,
        },
    );

    let runner = JobRunner::new(
        Arc::new(collector),
        store.clone(),
        build_templater(&config),
        config.locale.clone(),
        chrono::Duration::hours(config.cache_ttl_hours),
    );

    let app = router(Arc::new(AppState { runner, store }));

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Tubescout API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
