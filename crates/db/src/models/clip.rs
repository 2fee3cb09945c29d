//! Clip and generation result rows.

use serde::Serialize;
use sqlx::FromRow;

use genqueue_core::clip::ClipRecord;
use genqueue_core::types::{DbId, Timestamp};

/// The columns of `clips` the queue reads.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClipRow {
    pub id: DbId,
    pub project_id: DbId,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
}

impl From<ClipRow> for ClipRecord {
    fn from(row: ClipRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            prompt: row.prompt,
            negative_prompt: row.negative_prompt,
        }
    }
}

/// A row from `clip_generations`, one per completed job.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClipGeneration {
    pub job_id: String,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: String,
    pub prompt: String,
    pub backend_id: Option<String>,
    pub result: serde_json::Value,
    pub completed_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_row_converts_to_record() {
        let record = ClipRecord::from(ClipRow {
            id: 4,
            project_id: 2,
            prompt: Some("harbour at dawn".to_string()),
            negative_prompt: None,
        });
        assert_eq!(record.id, 4);
        assert_eq!(record.project_id, 2);
        assert_eq!(record.prompt.as_deref(), Some("harbour at dawn"));
    }
}
