use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Job routes mounted at `/queue`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/priority", put(jobs::update_priority))
        .route("/retry/{id}", post(jobs::retry_job))
        .route("/cancel/{id}", post(jobs::cancel_job))
        .route("/job/{id}", delete(jobs::delete_job))
        .route("/clear", delete(jobs::clear_jobs))
        .route("/status", get(jobs::queue_status))
        .route("/backends", get(jobs::list_backends))
}
