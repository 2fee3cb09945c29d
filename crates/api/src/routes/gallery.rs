use axum::routing::get;
use axum::Router;

use crate::handlers::gallery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gallery/clips/{clip_id}", get(gallery::clip_results))
        .route("/gallery/projects/{project_id}", get(gallery::project_results))
}
