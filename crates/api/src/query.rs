//! Query parameter types shared across handlers.

use std::str::FromStr;

use serde::Deserialize;

use genqueue_core::job::JobStatus;

use crate::error::AppResult;

/// `?status=` filter for job listing and clearing.
#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

impl StatusFilter {
    /// Parse the filter. An absent or empty value means "all statuses".
    pub fn parse(&self) -> AppResult<Option<JobStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Ok(Some(JobStatus::from_str(raw)?)),
        }
    }
}

/// `?delete_jobs=` flag for batch deletion.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteBatchParams {
    #[serde(default)]
    pub delete_jobs: bool,
}
