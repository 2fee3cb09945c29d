//! [`ClipStore`] backed by Postgres.

use async_trait::async_trait;

use genqueue_core::clip::{ClipRecord, ClipStore};
use genqueue_core::error::CoreError;
use genqueue_core::job::Job;
use genqueue_core::types::DbId;

use crate::repositories::clip_repo::RecordGeneration;
use crate::repositories::ClipRepo;
use crate::DbPool;

pub struct PgClipStore {
    pool: DbPool,
}

impl PgClipStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("Database error: {err}"))
}

#[async_trait]
impl ClipStore for PgClipStore {
    /// The project is checked by the caller, so a clip from another
    /// project is still returned.
    async fn find_clip(
        &self,
        _project_id: DbId,
        clip_id: DbId,
    ) -> Result<Option<ClipRecord>, CoreError> {
        let row = ClipRepo::find_by_id(&self.pool, clip_id)
            .await
            .map_err(internal)?;
        Ok(row.map(ClipRecord::from))
    }

    async fn save_generation_result(&self, job: &Job) -> Result<(), CoreError> {
        let result = job.result.as_ref().ok_or_else(|| {
            CoreError::Validation(format!("Job {} has no result to persist", job.id))
        })?;
        let completed_at = job.completed_at.unwrap_or(job.created_at);

        let saved = ClipRepo::upsert_generation(
            &self.pool,
            &RecordGeneration {
                job_id: &job.id,
                clip_id: job.clip_id,
                project_id: job.project_id,
                generation_type: job.generation_type.as_str(),
                prompt: &job.prompt,
                backend_id: job.assigned_backend_id.as_deref(),
                result,
                completed_at,
            },
        )
        .await
        .map_err(internal)?;

        tracing::debug!(job_id = %saved.job_id, clip_id = saved.clip_id, "Generation row upserted");
        Ok(())
    }
}
