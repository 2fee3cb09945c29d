use sqlx::PgPool;

use genqueue_core::types::{DbId, Timestamp};

use crate::models::clip::{ClipGeneration, ClipRow};

/// Column list for `clips` queries.
const CLIP_COLUMNS: &str = "id, project_id, prompt, negative_prompt";

/// Column list for `clip_generations` queries.
const GENERATION_COLUMNS: &str = "\
    job_id, clip_id, project_id, generation_type, prompt, \
    backend_id, result, completed_at";

/// Parameters for recording a finished generation.
#[derive(Debug)]
pub struct RecordGeneration<'a> {
    pub job_id: &'a str,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: &'a str,
    pub prompt: &'a str,
    pub backend_id: Option<&'a str>,
    pub result: &'a serde_json::Value,
    pub completed_at: Timestamp,
}

pub struct ClipRepo;

impl ClipRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ClipRow>, sqlx::Error> {
        let query = format!("SELECT {CLIP_COLUMNS} FROM clips WHERE id = $1");
        sqlx::query_as::<_, ClipRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the generation row for a job.
    pub async fn upsert_generation(
        pool: &PgPool,
        input: &RecordGeneration<'_>,
    ) -> Result<ClipGeneration, sqlx::Error> {
        let query = format!(
            "INSERT INTO clip_generations (\
                job_id, clip_id, project_id, generation_type, prompt, \
                backend_id, result, completed_at\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (job_id) DO UPDATE SET \
                result = EXCLUDED.result, \
                backend_id = EXCLUDED.backend_id, \
                completed_at = EXCLUDED.completed_at \
             RETURNING {GENERATION_COLUMNS}"
        );
        sqlx::query_as::<_, ClipGeneration>(&query)
            .bind(input.job_id)
            .bind(input.clip_id)
            .bind(input.project_id)
            .bind(input.generation_type)
            .bind(input.prompt)
            .bind(input.backend_id)
            .bind(input.result)
            .bind(input.completed_at)
            .fetch_one(pool)
            .await
    }
}
