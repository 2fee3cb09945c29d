//! Uniform worker capability consumed by the dispatch loop.
//!
//! Every generation engine (ComfyUI instance, hosted video API, face
//! service, in-process mock) is driven through [`WorkerBackend`]. The
//! dispatcher never sees a vendor protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::Job;

/// Opaque identifier a backend returns for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendHandle(pub String);

impl BackendHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of polling a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendPoll {
    /// Still running. `progress` is 0-100 when the backend reports it.
    Pending { progress: Option<u8> },
    /// Finished; the value references the produced asset(s).
    Completed(serde_json::Value),
    /// Finished unsuccessfully with a human-readable reason.
    Failed(String),
}

/// Errors returned by backend adapters.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached (network, DNS, 5xx).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused or could not understand the request.
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// The backend does not know the given handle.
    #[error("Unknown backend handle: {0}")]
    UnknownHandle(String),
}

/// A generation engine capable of executing one job at a time per handle.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Stable id, matching the registration in the load tracker.
    fn id(&self) -> &str;

    /// Hand a job to the backend. Returns a handle for polling.
    async fn submit(&self, job: &Job) -> Result<BackendHandle, BackendError>;

    /// Check on a submitted job.
    async fn poll(&self, handle: &BackendHandle) -> Result<BackendPoll, BackendError>;

    /// Best-effort cancellation. Backends may still finish the work.
    async fn cancel(&self, handle: &BackendHandle) -> Result<(), BackendError>;

    /// Reachability probe used by the health monitor.
    async fn health(&self) -> bool;
}
