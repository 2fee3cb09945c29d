//! Queue lifecycle events.
//!
//! Published on a [`tokio::sync::broadcast`] channel owned by the
//! [`QueueManager`](crate::queue::QueueManager). Call
//! `QueueManager::subscribe` to receive them.

use serde::Serialize;

use genqueue_core::job::Job;
use genqueue_core::types::JobId;

/// A state change of a queued job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    JobQueued { job_id: JobId, priority: i32 },

    JobStarted { job_id: JobId, backend_id: String },

    JobProgress { job_id: JobId, percent: u8 },

    /// Carries the full job so consumers can persist the result without
    /// re-reading the queue (which may have deleted it by then).
    JobCompleted { job: Job },

    JobFailed {
        job_id: JobId,
        error: String,
        retry_count: u32,
    },

    JobCancelled { job_id: JobId },

    JobRetried {
        job_id: JobId,
        retry_count: u32,
        /// `true` when the auto-retry policy re-queued the job.
        automatic: bool,
    },

    JobDeleted { job_id: JobId },
}

impl QueueEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::JobQueued { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id }
            | Self::JobRetried { job_id, .. }
            | Self::JobDeleted { job_id } => job_id,
            Self::JobCompleted { job } => &job.id,
        }
    }
}
