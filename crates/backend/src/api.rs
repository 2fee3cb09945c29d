//! REST client for the uniform worker HTTP contract.
//!
//! | Method | Path | Body / response |
//! |---|---|---|
//! | `POST` | `/jobs` | [`SubmitRequest`] → [`SubmitResponse`] |
//! | `GET` | `/jobs/{handle}` | → [`StatusResponse`] |
//! | `DELETE` | `/jobs/{handle}` | 2xx on success |
//! | `GET` | `/health` | 2xx when healthy |

use serde::{Deserialize, Serialize};

use genqueue_core::job::{GenerationType, Job};
use genqueue_core::types::{DbId, JobId};

/// HTTP client for a single worker.
pub struct WorkerApi {
    client: reqwest::Client,
    base_url: String,
}

/// Body of `POST /jobs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_id: JobId,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: GenerationType,
    pub prompt: String,
    pub negative_prompt: String,
    pub parameters: serde_json::Value,
}

impl From<&Job> for SubmitRequest {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            clip_id: job.clip_id,
            project_id: job.project_id,
            generation_type: job.generation_type,
            prompt: job.prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            parameters: job.parameters.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Worker-assigned identifier for the accepted job.
    pub handle: String,
}

/// Job state as reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerJobState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Body of `GET /jobs/{handle}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: WorkerJobState,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Errors from the worker REST layer.
#[derive(Debug, thiserror::Error)]
pub enum WorkerApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker returned a non-2xx status code.
    #[error("Worker API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl WorkerApi {
    /// * `base_url` - e.g. `http://gpu-01:9000`. A trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, WorkerApiError> {
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn status(&self, handle: &str) -> Result<StatusResponse, WorkerApiError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, handle))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn cancel(&self, handle: &str) -> Result<(), WorkerApiError> {
        let response = self
            .client
            .delete(format!("{}/jobs/{}", self.base_url, handle))
            .send()
            .await?;

        Self::check_status(response).await
    }

    pub async fn health(&self) -> Result<(), WorkerApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WorkerApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WorkerApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WorkerApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), WorkerApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
