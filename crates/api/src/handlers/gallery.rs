use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use genqueue_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue/gallery/clips/{clip_id}
///
/// Results in recording order. An unknown clip yields an empty list.
pub async fn clip_results(
    State(state): State<AppState>,
    Path(clip_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.gallery().list_results(clip_id).await,
    }))
}

/// GET /api/v1/queue/gallery/projects/{project_id}
pub async fn project_results(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.gallery().list_project_results(project_id).await,
    }))
}
