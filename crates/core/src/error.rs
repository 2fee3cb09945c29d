use crate::job::JobStatus;
use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Job {job_id} already exists")]
    DuplicateJob { job_id: JobId },

    #[error("Job {job_id} not found")]
    JobNotFound { job_id: JobId },

    #[error("Cannot {action} job {job_id} while it is {status}")]
    InvalidStateTransition {
        job_id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("No backend available: {0}")]
    BackendUnavailable(String),

    #[error("Backend {backend_id} failed: {message}")]
    BackendExecution { backend_id: String, message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
