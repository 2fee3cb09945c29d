pub mod batches;
pub mod gallery;
pub mod health;
pub mod queue;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /queue/jobs                         submit (POST), list (GET, ?status=)
/// /queue/jobs/{id}                    get
/// /queue/jobs/{id}/priority           reprioritize a queued job (PUT)
/// /queue/retry/{id}                   retry a failed job (POST)
/// /queue/cancel/{id}                  cancel (POST)
/// /queue/job/{id}                     delete (DELETE)
/// /queue/clear                        clear by status (DELETE, ?status=)
/// /queue/status                       queue summary
/// /queue/backends                     backend load and health
///
/// /queue/batches                      submit (POST), list (GET)
/// /queue/batches/{id}                 report (GET), delete (DELETE, ?delete_jobs=)
/// /queue/batches/{id}/cancel          cancel members (POST)
///
/// /queue/gallery/clips/{clip_id}      results for a clip
/// /queue/gallery/projects/{id}        results for a project
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/queue",
        queue::router()
            .merge(batches::router())
            .merge(gallery::router()),
    )
}
