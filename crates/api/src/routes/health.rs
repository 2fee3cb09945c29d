use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when no backend is healthy or the database is down.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub healthy_backends: usize,
    pub total_backends: usize,
    /// `None` when running without a database.
    pub db_healthy: Option<bool>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backends = state.queue().backends().await;
    let healthy_backends = backends.iter().filter(|b| b.healthy).count();

    let db_healthy = match &state.pool {
        Some(pool) => Some(genqueue_db::health_check(pool).await.is_ok()),
        None => None,
    };

    let degraded = healthy_backends == 0 || db_healthy == Some(false);
    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        healthy_backends,
        total_backends: backends.len(),
        db_healthy,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
