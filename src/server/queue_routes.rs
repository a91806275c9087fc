//! Queue ingress and introspection routes.
//!
//! - `POST /api/tracks/download` enqueues a download job
//! - `GET /api/queue/jobs` lists jobs with a computed summary
//! - `GET /api/queue/jobs/{id}` point lookup
//! - `DELETE /api/queue/jobs` bulk clear, `DELETE /api/queue/jobs/{id}`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::job_queue::{priority, DownloadJobPayload, JobDetails, QueueKind, QueueSummary};
use crate::server::state::{GuardedJobQueueStore, ServerState};

/// Bounded listing; jobs past this are reachable by id only.
const LIST_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    error!("Queue route error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
struct EnqueueDownloadBody {
    #[serde(flatten)]
    payload: DownloadJobPayload,
    #[serde(default)]
    priority: Option<i32>,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    success: bool,
    job_id: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct JobsResponse {
    jobs: Vec<JobDetails>,
    summary: QueueSummary,
}

/// POST /api/tracks/download
async fn enqueue_download(
    State(store): State<GuardedJobQueueStore>,
    State(state): State<ServerState>,
    Json(body): Json<EnqueueDownloadBody>,
) -> impl IntoResponse {
    if body.payload.track_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "track_id and friend_id are required".to_string(),
            }),
        )
            .into_response();
    }
    if !body.payload.has_source_url() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "At least one music service URL is required".to_string(),
            }),
        )
            .into_response();
    }

    let data = match serde_json::to_value(&body.payload) {
        Ok(data) => data,
        Err(e) => return internal_error(e).into_response(),
    };

    match store.enqueue(
        QueueKind::Download,
        data,
        body.priority.unwrap_or(priority::NORMAL),
        state.download_max_attempts,
    ) {
        Ok(job_id) => {
            info!(
                "Queued download job {} for track {}",
                job_id, body.payload.track_id
            );
            Json(EnqueueResponse {
                success: true,
                job_id,
                message: "Audio processing job queued successfully".to_string(),
            })
            .into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

/// GET /api/queue/jobs
async fn list_jobs(State(store): State<GuardedJobQueueStore>) -> impl IntoResponse {
    let jobs = match store.list_recent(LIST_LIMIT) {
        Ok(jobs) => jobs,
        Err(e) => return internal_error(e).into_response(),
    };
    let summary = match store.summary() {
        Ok(summary) => summary,
        Err(e) => return internal_error(e).into_response(),
    };

    Json(JobsResponse {
        jobs: jobs.iter().map(|j| j.to_details()).collect(),
        summary,
    })
    .into_response()
}

/// GET /api/queue/jobs/{id}
async fn get_job(
    State(store): State<GuardedJobQueueStore>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match store.get_job(&id) {
        Ok(Some(job)) => Json(job.to_details()).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Job not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// DELETE /api/queue/jobs
async fn clear_jobs(State(store): State<GuardedJobQueueStore>) -> impl IntoResponse {
    match store.clear_all() {
        Ok(count) => Json(serde_json::json!({
            "success": true,
            "message": format!("Cleared {} jobs from both queues", count),
        }))
        .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// DELETE /api/queue/jobs/{id}
async fn delete_job(
    State(store): State<GuardedJobQueueStore>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match store.delete_job(&id) {
        Ok(true) => Json(serde_json::json!({"success": true})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Job not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub fn make_queue_routes() -> Router<ServerState> {
    Router::new()
        .route("/api/tracks/download", post(enqueue_download))
        .route("/api/queue/jobs", get(list_jobs).delete(clear_jobs))
        .route("/api/queue/jobs/{id}", get(get_job).delete(delete_job))
}
