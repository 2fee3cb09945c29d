use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use genqueue_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent `{"error", "code"}`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::JobNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::DuplicateJob { .. } => {
                    (StatusCode::CONFLICT, "DUPLICATE_JOB", core.to_string())
                }
                CoreError::InvalidStateTransition { job_id, status, .. } => {
                    details = Some(json!({ "job_id": job_id, "status": status }));
                    (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION", core.to_string())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::BackendUnavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    core.to_string(),
                ),
                CoreError::BackendExecution { .. } => {
                    (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", core.to_string())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        INTERNAL_MESSAGE.to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let (Some(body), Some(serde_json::Value::Object(extra))) = (body.as_object_mut(), details) {
            body.extend(extra);
        }

        (status, axum::Json(body)).into_response()
    }
}
