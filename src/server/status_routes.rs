//! Status-store job routes, worker report-back routes and the
//! acquisition settings API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::error;

use super::queue_routes::ErrorResponse;
use crate::job_status::{CreateDownloadJobRequest, JobStatus, JobStatusError};
use crate::server::state::{GuardedJobStatusManager, GuardedSettingsStore, ServerState};
use crate::settings::AcquisitionOptions;

fn status_error(e: JobStatusError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        JobStatusError::Validation(_) => StatusCode::BAD_REQUEST,
        JobStatusError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Job status route error: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// POST /api/jobs
async fn create_job(
    State(manager): State<GuardedJobStatusManager>,
    Json(request): Json<CreateDownloadJobRequest>,
) -> impl IntoResponse {
    match manager.create_download_job(&request) {
        Ok(job_id) => Json(serde_json::json!({
            "success": true,
            "job_id": job_id,
        }))
        .into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// GET /api/jobs
async fn list_jobs(State(manager): State<GuardedJobStatusManager>) -> impl IntoResponse {
    match manager.list_jobs() {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// GET /api/jobs/summary
async fn job_summary(State(manager): State<GuardedJobStatusManager>) -> impl IntoResponse {
    match manager.summary() {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// GET /api/jobs/{job_id}
async fn get_job(
    State(manager): State<GuardedJobStatusManager>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match manager.get_job(&job_id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Job not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// DELETE /api/jobs
async fn clear_jobs(State(manager): State<GuardedJobStatusManager>) -> impl IntoResponse {
    match manager.clear_all() {
        Ok(count) => Json(serde_json::json!({
            "success": true,
            "message": format!("Cleared {} jobs", count),
        }))
        .into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// DELETE /api/jobs/{job_id}
async fn delete_job(
    State(manager): State<GuardedJobStatusManager>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match manager.delete_job(&job_id) {
        Ok(true) => Json(serde_json::json!({"success": true})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Job not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

/// POST /api/worker/poll — hand the oldest pending payload to a worker.
async fn worker_poll(State(manager): State<GuardedJobStatusManager>) -> impl IntoResponse {
    match manager.dequeue_pending() {
        Ok(Some(payload)) => Json(payload).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct WorkerStatusBody {
    status: JobStatus,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// PUT /api/worker/jobs/{job_id}/status — worker report-back.
async fn worker_update_status(
    State(manager): State<GuardedJobStatusManager>,
    Path(job_id): Path<String>,
    Json(body): Json<WorkerStatusBody>,
) -> impl IntoResponse {
    match manager.update_status(
        &job_id,
        body.status,
        body.progress,
        body.error.as_deref(),
        body.result.as_ref(),
    ) {
        Ok(true) => Json(serde_json::json!({"success": true})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Job not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => status_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SettingsQuery {
    friend_id: i64,
}

/// GET /api/settings/acquisition?friend_id=N
async fn get_settings(
    State(store): State<GuardedSettingsStore>,
    Query(query): Query<SettingsQuery>,
) -> impl IntoResponse {
    match store.read_or_default(query.friend_id) {
        Ok(settings) => Json(serde_json::json!({"settings": settings})).into_response(),
        Err(e) => {
            error!("Failed to read acquisition settings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsBody {
    friend_id: i64,
    #[serde(flatten)]
    patch: AcquisitionOptions,
}

/// PUT /api/settings/acquisition
async fn update_settings(
    State(store): State<GuardedSettingsStore>,
    Json(body): Json<UpdateSettingsBody>,
) -> impl IntoResponse {
    if body.patch.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No valid fields to update".to_string(),
            }),
        )
            .into_response();
    }

    match store.update(body.friend_id, &body.patch) {
        Ok(settings) => Json(serde_json::json!({
            "success": true,
            "settings": settings,
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to update acquisition settings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub fn make_status_routes() -> Router<ServerState> {
    Router::new()
        .route("/api/jobs", post(create_job).get(list_jobs).delete(clear_jobs))
        .route("/api/jobs/summary", get(job_summary))
        .route("/api/jobs/{job_id}", get(get_job).delete(delete_job))
        .route("/api/worker/poll", post(worker_poll))
        .route("/api/worker/jobs/{job_id}/status", put(worker_update_status))
        .route(
            "/api/settings/acquisition",
            get(get_settings).put(update_settings),
        )
}
