//! [`WorkerBackend`] over the uniform worker HTTP contract.

use std::time::Duration;

use async_trait::async_trait;

use genqueue_core::backend::{BackendError, BackendHandle, BackendPoll, WorkerBackend};
use genqueue_core::job::Job;

use crate::api::{SubmitRequest, WorkerApi, WorkerApiError, WorkerJobState};

/// Per-request timeout for worker calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpWorkerBackend {
    id: String,
    api: WorkerApi,
}

impl HttpWorkerBackend {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(id, base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        id: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            id: id.into(),
            api: WorkerApi::with_client(client, base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }
}

/// Map transport and status errors onto the backend taxonomy.
///
/// Network failures and 5xx mean the worker is unreachable; 404 on a job
/// route means the handle is unknown; any other 4xx or an undecodable body
/// is a rejection.
fn map_error(err: WorkerApiError, handle: Option<&BackendHandle>) -> BackendError {
    match err {
        WorkerApiError::Request(e) if e.is_decode() => {
            BackendError::Rejected(format!("Malformed worker response: {e}"))
        }
        WorkerApiError::Request(e) => BackendError::Unavailable(e.to_string()),
        WorkerApiError::ApiError { status: 404, body } => match handle {
            Some(h) => BackendError::UnknownHandle(h.to_string()),
            None => BackendError::Rejected(body),
        },
        WorkerApiError::ApiError { status, body } if status >= 500 => {
            BackendError::Unavailable(format!("Worker returned {status}: {body}"))
        }
        WorkerApiError::ApiError { status, body } => {
            BackendError::Rejected(format!("Worker returned {status}: {body}"))
        }
    }
}

#[async_trait]
impl WorkerBackend for HttpWorkerBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(&self, job: &Job) -> Result<BackendHandle, BackendError> {
        let response = self
            .api
            .submit(&SubmitRequest::from(job))
            .await
            .map_err(|e| map_error(e, None))?;
        if response.handle.is_empty() {
            return Err(BackendError::Rejected(
                "Worker returned an empty handle".to_string(),
            ));
        }
        tracing::debug!(
            backend_id = %self.id,
            job_id = %job.id,
            handle = %response.handle,
            "Job accepted by worker",
        );
        Ok(BackendHandle::new(response.handle))
    }

    async fn poll(&self, handle: &BackendHandle) -> Result<BackendPoll, BackendError> {
        let status = self
            .api
            .status(handle.as_str())
            .await
            .map_err(|e| map_error(e, Some(handle)))?;

        Ok(match status.status {
            WorkerJobState::Queued | WorkerJobState::Running => BackendPoll::Pending {
                progress: status.progress.map(|p| p.clamp(0.0, 100.0) as u8),
            },
            WorkerJobState::Completed => {
                BackendPoll::Completed(status.result.unwrap_or(serde_json::Value::Null))
            }
            WorkerJobState::Failed => BackendPoll::Failed(
                status
                    .error
                    .unwrap_or_else(|| "Worker reported failure without a message".to_string()),
            ),
        })
    }

    async fn cancel(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        self.api
            .cancel(handle.as_str())
            .await
            .map_err(|e| map_error(e, Some(handle)))
    }

    async fn health(&self) -> bool {
        match self.api.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(backend_id = %self.id, error = %e, "Worker health check failed");
                false
            }
        }
    }
}
