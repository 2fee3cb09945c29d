use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/queue/batches`.
///
/// ```text
/// GET    /batches               -> list_batches
/// POST   /batches               -> submit_batch
/// GET    /batches/{id}          -> get_batch
/// DELETE /batches/{id}          -> delete_batch
/// POST   /batches/{id}/cancel   -> cancel_batch
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/batches", get(batches::list_batches).post(batches::submit_batch))
        .route(
            "/batches/{id}",
            get(batches::get_batch).delete(batches::delete_batch),
        )
        .route("/batches/{id}/cancel", post(batches::cancel_batch))
}
