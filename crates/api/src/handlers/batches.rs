//! Handlers for `/queue/batches`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use genqueue_pipeline::service::BatchRequest;

use crate::error::AppResult;
use crate::query::DeleteBatchParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteBatchResponse {
    pub batch_id: String,
    pub deleted_jobs: usize,
}

/// POST /api/v1/queue/batches
///
/// Every item is validated before any job is queued. Returns 201 with the
/// initial batch report.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchRequest>,
) -> AppResult<impl IntoResponse> {
    let batch = state.service.submit_batch(input).await?;
    let report = state.batches().batch_status(&batch.batch_id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: report })))
}

/// GET /api/v1/queue/batches
pub async fn list_batches(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.batches().list_batches().await,
    }))
}

/// GET /api/v1/queue/batches/{id}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let report = state.batches().batch_status(&batch_id).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/queue/batches/{id}/cancel
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let report = state.batches().cancel_batch(&batch_id).await?;
    Ok(Json(DataResponse { data: report }))
}

/// DELETE /api/v1/queue/batches/{id}?delete_jobs=
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Query(params): Query<DeleteBatchParams>,
) -> AppResult<impl IntoResponse> {
    let deleted_jobs = state
        .batches()
        .delete_batch(&batch_id, params.delete_jobs)
        .await?;
    Ok(Json(DataResponse {
        data: DeleteBatchResponse {
            batch_id,
            deleted_jobs,
        },
    }))
}
