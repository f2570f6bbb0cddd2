use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use tubescout_collector::{CollectorError, RunReport};
use tubescout_common::RunStatus;

use crate::AppState;

#[derive(Deserialize)]
pub struct CollectRequest {
    keyword: String,
    #[serde(default)]
    force_refresh: bool,
}

#[derive(Serialize)]
pub struct CollectResponse {
    job_id: Uuid,
    status: RunStatus,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<RunReport>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub async fn api_collect_youtube(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CollectRequest>,
) -> impl IntoResponse {
    let keyword = body.keyword.as_str();
    if keyword.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "keyword must not be blank");
    }

    let submission = match state.runner.submit_job(keyword, body.force_refresh).await {
        Ok(s) => s,
        Err(CollectorError::InvalidInput(msg)) => {
            return error_response(StatusCode::BAD_REQUEST, msg);
        }
        Err(e) => {
            warn!(error = %e, keyword, "Failed to submit collection job");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to submit job");
        }
    };

    // A cached hit is already complete, so hand back its results inline.
    let result = if submission.cached {
        match state.runner.run_status(submission.run_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, run_id = %submission.run_id, "Failed to load cached run");
                None
            }
        }
    } else {
        None
    };

    Json(CollectResponse {
        job_id: submission.run_id,
        status: submission.status,
        cached: submission.cached,
        result,
    })
    .into_response()
}

pub async fn api_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.runner.run_status(job_id).await {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "job not found"),
        Err(e) => {
            warn!(error = %e, %job_id, "Failed to load run status");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load job")
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => Json(serde_json::json!({ "status": "ok", "database": "ok" })).into_response(),
        Err(e) => {
            warn!(error = %e, "Health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "unavailable" })),
            )
                .into_response()
        }
    }
}
