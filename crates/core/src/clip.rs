//! Clip repository collaborator.
//!
//! Clips and projects are owned by the surrounding application. The queue
//! only needs to resolve a clip before accepting a job and to persist the
//! final result once it completes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::Job;
use crate::types::DbId;

/// The parts of a clip the generation service needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: DbId,
    pub project_id: DbId,
    /// Stored prompt used when a request does not carry its own.
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
}

#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Resolve a clip. `None` when it does not exist. Implementations may
    /// return a clip from another project; the caller checks ownership.
    async fn find_clip(
        &self,
        project_id: DbId,
        clip_id: DbId,
    ) -> Result<Option<ClipRecord>, CoreError>;

    /// Persist the result of a completed job against its clip.
    ///
    /// Must be idempotent per job id.
    async fn save_generation_result(&self, job: &Job) -> Result<(), CoreError>;
}
