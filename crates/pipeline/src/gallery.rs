//! Completed-output store, keyed by job id and listed per clip or project.
//!
//! Write-mostly: the queue records every completed job here, readers list
//! results for a clip. Recording the same job twice replaces the entry in
//! place.

use serde::Serialize;
use tokio::sync::RwLock;

use genqueue_core::error::CoreError;
use genqueue_core::job::{GenerationType, Job, JobStatus};
use genqueue_core::types::{DbId, JobId, Timestamp};

/// One generated asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryEntry {
    pub job_id: JobId,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: GenerationType,
    pub prompt: String,
    pub result: serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct GalleryManager {
    /// Recording order. Job ids are unique.
    entries: RwLock<Vec<GalleryEntry>>,
}

impl GalleryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the output of a completed job.
    ///
    /// Rejects jobs that are not `completed` or carry no result.
    pub async fn record_result(&self, job: &Job) -> Result<GalleryEntry, CoreError> {
        if job.status != JobStatus::Completed {
            return Err(CoreError::Validation(format!(
                "Job {} is {}, only completed jobs can be recorded",
                job.id, job.status
            )));
        }
        let result = job.result.clone().ok_or_else(|| {
            CoreError::Validation(format!("Job {} completed without a result", job.id))
        })?;

        let entry = GalleryEntry {
            job_id: job.id.clone(),
            clip_id: job.clip_id,
            project_id: job.project_id,
            generation_type: job.generation_type,
            prompt: job.prompt.clone(),
            result,
            created_at: job.completed_at.unwrap_or(job.created_at),
        };

        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.job_id == entry.job_id) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        drop(entries);

        tracing::debug!(job_id = %job.id, clip_id = job.clip_id, "Recorded gallery entry");
        Ok(entry)
    }

    /// Results for a clip, in recording order.
    pub async fn list_results(&self, clip_id: DbId) -> Vec<GalleryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.clip_id == clip_id)
            .cloned()
            .collect()
    }

    pub async fn list_project_results(&self, project_id: DbId) -> Vec<GalleryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn get(&self, job_id: &str) -> Option<GalleryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.job_id == job_id)
            .cloned()
    }
}
