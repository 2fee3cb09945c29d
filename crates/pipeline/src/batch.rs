//! Grouped submission on top of [`QueueManager`].
//!
//! The generator only remembers which job ids belong to which batch. Status
//! is always recomputed from the live member jobs.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use genqueue_core::batch::{Batch, BatchReport};
use genqueue_core::error::CoreError;
use genqueue_core::job::{JobStatus, NewJob};

use crate::queue::QueueManager;

pub struct BatchGenerator {
    queue: Arc<QueueManager>,
    /// Submission order.
    batches: RwLock<Vec<Batch>>,
}

impl BatchGenerator {
    pub fn new(queue: Arc<QueueManager>) -> Self {
        Self {
            queue,
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Queue every job and group them under a fresh batch id.
    ///
    /// All-or-nothing: if any member is rejected, members already queued
    /// are deleted again and the error is returned.
    pub async fn submit_batch(&self, jobs: Vec<NewJob>, fail_fast: bool) -> Result<Batch, CoreError> {
        if jobs.is_empty() {
            return Err(CoreError::Validation(
                "Batch must contain at least one job".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = jobs.iter().find(|j| !seen.insert(j.job_id.as_str())) {
            return Err(CoreError::Validation(format!(
                "Duplicate job id '{}' in batch",
                dup.job_id
            )));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut added = Vec::with_capacity(jobs.len());
        for mut input in jobs {
            input.batch_id = Some(batch_id.clone());
            match self.queue.add_job(input).await {
                Ok(job) => added.push(job.id),
                Err(e) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        error = %e,
                        rolled_back = added.len(),
                        "Batch submission rejected, rolling back",
                    );
                    for job_id in &added {
                        if let Err(e) = self.queue.delete_job(job_id).await {
                            tracing::error!(job_id = %job_id, error = %e, "Rollback delete failed");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let batch = Batch {
            batch_id: batch_id.clone(),
            job_ids: added,
            fail_fast,
            created_at: Utc::now(),
        };
        self.batches.write().await.push(batch.clone());

        tracing::info!(
            batch_id = %batch_id,
            job_count = batch.job_ids.len(),
            fail_fast,
            "Batch submitted",
        );
        Ok(batch)
    }

    /// Current report for a batch.
    ///
    /// A batch whose members have all been deleted is pruned and reported
    /// as not found.
    pub async fn batch_status(&self, batch_id: &str) -> Result<BatchReport, CoreError> {
        let batch = self.find(batch_id).await?;
        let jobs = self.queue.get_jobs(&batch.job_ids).await;
        if jobs.is_empty() {
            self.forget(batch_id).await;
            tracing::debug!(batch_id, "Pruned batch with no remaining members");
            return Err(not_found(batch_id));
        }
        Ok(BatchReport::new(batch, jobs))
    }

    /// Cancel every member that is still `queued` or `processing`.
    pub async fn cancel_batch(&self, batch_id: &str) -> Result<BatchReport, CoreError> {
        let batch = self.find(batch_id).await?;
        let mut cancelled = 0usize;
        for job in self.queue.get_jobs(&batch.job_ids).await {
            if !matches!(job.status, JobStatus::Queued | JobStatus::Processing) {
                continue;
            }
            match self.queue.cancel_job(&job.id).await {
                Ok(_) => cancelled += 1,
                // Finished or removed between the snapshot and the cancel.
                Err(CoreError::JobNotFound { .. } | CoreError::InvalidStateTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(batch_id, cancelled, "Batch cancelled");
        self.batch_status(batch_id).await
    }

    /// Reports for every known batch, in submission order. Batches with no
    /// remaining members are pruned.
    pub async fn list_batches(&self) -> Vec<BatchReport> {
        let batches: Vec<Batch> = self.batches.read().await.clone();
        let mut reports = Vec::with_capacity(batches.len());
        let mut empty = Vec::new();
        for batch in batches {
            let jobs = self.queue.get_jobs(&batch.job_ids).await;
            if jobs.is_empty() {
                empty.push(batch.batch_id);
            } else {
                reports.push(BatchReport::new(batch, jobs));
            }
        }
        if !empty.is_empty() {
            self.batches
                .write()
                .await
                .retain(|b| !empty.contains(&b.batch_id));
        }
        reports
    }

    /// Forget a batch. With `delete_jobs`, its members are deleted from the
    /// queue as well. Returns the number of member jobs deleted.
    pub async fn delete_batch(&self, batch_id: &str, delete_jobs: bool) -> Result<usize, CoreError> {
        let batch = self
            .forget(batch_id)
            .await
            .ok_or_else(|| not_found(batch_id))?;

        let mut deleted = 0usize;
        if delete_jobs {
            for job_id in &batch.job_ids {
                match self.queue.delete_job(job_id).await {
                    Ok(_) => deleted += 1,
                    Err(CoreError::JobNotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        tracing::info!(batch_id, delete_jobs, deleted, "Batch deleted");
        Ok(deleted)
    }

    async fn find(&self, batch_id: &str) -> Result<Batch, CoreError> {
        self.batches
            .read()
            .await
            .iter()
            .find(|b| b.batch_id == batch_id)
            .cloned()
            .ok_or_else(|| not_found(batch_id))
    }

    async fn forget(&self, batch_id: &str) -> Option<Batch> {
        let mut batches = self.batches.write().await;
        let pos = batches.iter().position(|b| b.batch_id == batch_id)?;
        Some(batches.remove(pos))
    }
}

fn not_found(batch_id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Batch",
        id: batch_id.to_string(),
    }
}
