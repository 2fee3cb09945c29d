//! Batch grouping and derived aggregate status.
//!
//! A batch stores only its member ids. Status and counts are always derived
//! from the current member jobs so there is nothing to keep in sync.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};
use crate::types::{JobId, Timestamp};

/// A group of jobs submitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub job_ids: Vec<JobId>,
    /// When set, a single failed member fails the whole batch.
    pub fail_fast: bool,
    pub created_at: Timestamp,
}

/// Aggregate batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Per-status member counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchCounts {
    pub fn from_statuses(statuses: &[JobStatus]) -> Self {
        let mut counts = Self {
            total: statuses.len(),
            ..Self::default()
        };
        for status in statuses {
            match status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Share of members that reached `completed` or `cancelled`, 0-100.
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = self.completed + self.cancelled;
        ((done * 100) / self.total) as u8
    }
}

/// Derive the aggregate status from member statuses.
///
/// - `Completed`: every member completed.
/// - `Failed`: any member failed and the batch is fail-fast.
/// - `Cancelled`: every member completed or cancelled, at least one cancelled.
/// - `InProgress`: everything else. A failed member of a non-fail-fast batch
///   keeps it in progress since the member can still be retried.
pub fn derive_status(statuses: &[JobStatus], fail_fast: bool) -> BatchStatus {
    let counts = BatchCounts::from_statuses(statuses);
    if counts.total > 0 && counts.completed == counts.total {
        BatchStatus::Completed
    } else if counts.failed > 0 && fail_fast {
        BatchStatus::Failed
    } else if counts.total > 0
        && counts.cancelled > 0
        && counts.completed + counts.cancelled == counts.total
    {
        BatchStatus::Cancelled
    } else {
        BatchStatus::InProgress
    }
}

/// Read model returned for batch queries.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch: Batch,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    pub progress_percent: u8,
    /// Members that were deleted after submission.
    pub missing_job_ids: Vec<JobId>,
    pub jobs: Vec<Job>,
}

impl BatchReport {
    /// Build a report from the batch and its currently present members.
    pub fn new(batch: Batch, jobs: Vec<Job>) -> Self {
        let statuses: Vec<JobStatus> = jobs.iter().map(|j| j.status).collect();
        let counts = BatchCounts::from_statuses(&statuses);
        let missing_job_ids = batch
            .job_ids
            .iter()
            .filter(|id| !jobs.iter().any(|j| &j.id == *id))
            .cloned()
            .collect();
        Self {
            status: derive_status(&statuses, batch.fail_fast),
            progress_percent: counts.progress_percent(),
            counts,
            missing_job_ids,
            jobs,
            batch,
        }
    }
}
