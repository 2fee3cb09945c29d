//! In-process [`ClipStore`] used when no database is configured, and by tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use genqueue_core::clip::{ClipRecord, ClipStore};
use genqueue_core::error::CoreError;
use genqueue_core::job::Job;
use genqueue_core::types::{DbId, JobId};

#[derive(Default)]
pub struct MemoryClipStore {
    clips: RwLock<HashMap<DbId, ClipRecord>>,
    results: RwLock<HashMap<JobId, Job>>,
    /// Resolve unknown clips as prompt-less records of the requested project.
    permissive: bool,
    /// Artificial latency per saved result.
    save_delay: Option<Duration>,
}

impl MemoryClipStore {
    /// A store that only knows clips added with [`insert_clip`](Self::insert_clip).
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that accepts any clip id.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    /// Sleep for `delay` before each saved result, to stand in for a slow
    /// database.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub async fn insert_clip(&self, clip: ClipRecord) {
        self.clips.write().await.insert(clip.id, clip);
    }

    /// Completed jobs persisted so far, keyed by job id.
    pub async fn saved_results(&self) -> HashMap<JobId, Job> {
        self.results.read().await.clone()
    }
}

#[async_trait]
impl ClipStore for MemoryClipStore {
    async fn find_clip(
        &self,
        project_id: DbId,
        clip_id: DbId,
    ) -> Result<Option<ClipRecord>, CoreError> {
        if let Some(clip) = self.clips.read().await.get(&clip_id) {
            return Ok(Some(clip.clone()));
        }
        Ok(self.permissive.then(|| ClipRecord {
            id: clip_id,
            project_id,
            prompt: None,
            negative_prompt: None,
        }))
    }

    async fn save_generation_result(&self, job: &Job) -> Result<(), CoreError> {
        if job.result.is_none() {
            return Err(CoreError::Validation(format!(
                "Job {} has no result to persist",
                job.id
            )));
        }
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        self.results.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }
}
