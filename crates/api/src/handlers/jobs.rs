//! Handlers for the `/queue` job endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use genqueue_core::job::JobStatus;
use genqueue_core::types::JobId;
use genqueue_pipeline::service::GenerationRequest;

use crate::error::AppResult;
use crate::query::StatusFilter;
use crate::response::DataResponse;
use crate::state::AppState;

/// Acknowledgement returned by cancel and delete.
#[derive(Debug, Serialize)]
pub struct JobAck {
    pub job_id: JobId,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted_count: usize,
    pub status_filter: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriority {
    pub priority: i32,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/queue/jobs
///
/// Validate and queue a generation request. Returns 201 with the queued job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.submit(input).await?;

    tracing::info!(
        job_id = %job.id,
        clip_id = job.clip_id,
        generation_type = %job.generation_type,
        priority = job.priority,
        "Generation job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/queue/jobs?status=
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> AppResult<impl IntoResponse> {
    let status = filter.parse()?;
    let jobs = state.queue().list_jobs(status).await;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/queue/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().get_job(&job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/queue/status
pub async fn queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.queue().summary().await,
    }))
}

/// GET /api/v1/queue/backends
pub async fn list_backends(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.queue().backends().await,
    }))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/queue/retry/{id}
///
/// Re-queue a failed job. Its retry count goes up by one and it keeps its
/// original place in the dispatch order.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().retry_job(&job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/queue/cancel/{id}
///
/// Cancelling a job that already completed or was cancelled is a no-op and
/// reports the unchanged status.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().cancel_job(&job_id).await?;
    Ok(Json(DataResponse {
        data: JobAck {
            job_id: job.id,
            status: job.status.as_str(),
        },
    }))
}

/// PUT /api/v1/queue/jobs/{id}/priority
pub async fn update_priority(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<UpdatePriority>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().update_priority(&job_id, input.priority).await?;
    Ok(Json(DataResponse { data: job }))
}

/// DELETE /api/v1/queue/job/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().delete_job(&job_id).await?;
    Ok(Json(DataResponse {
        data: JobAck {
            job_id: job.id,
            status: "deleted",
        },
    }))
}

/// DELETE /api/v1/queue/clear?status=
///
/// Without a filter every job is removed.
pub async fn clear_jobs(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> AppResult<impl IntoResponse> {
    let status = filter.parse()?;
    let deleted_count = state.queue().clear_jobs(status).await;
    Ok(Json(DataResponse {
        data: ClearResponse {
            deleted_count,
            status_filter: status,
        },
    }))
}
