//! Generation job entity and its lifecycle state machine.
//!
//! Every status change goes through [`Job::transition`], which rejects any
//! edge not listed in [`JobStatus::valid_transitions`]. The "convenience"
//! methods ([`Job::start`], [`Job::complete`], ...) pair a transition with
//! the field updates that belong to it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Generation type
// ---------------------------------------------------------------------------

/// The kind of media a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    Image,
    Video,
    TalkingHead,
    FaceOp,
}

impl GenerationType {
    /// All generation types, in declaration order.
    pub const ALL: [GenerationType; 4] = [
        GenerationType::Image,
        GenerationType::Video,
        GenerationType::TalkingHead,
        GenerationType::FaceOp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::TalkingHead => "talking_head",
            Self::FaceOp => "face_op",
        }
    }

    /// Whether a job of this type needs a non-empty prompt.
    ///
    /// Face operations work on an existing asset and take no prompt.
    pub fn requires_prompt(self) -> bool {
        !matches!(self, Self::FaceOp)
    }
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                CoreError::Validation(format!(
                    "Unknown generation type '{s}'. Valid types: {}",
                    valid.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the set of statuses reachable from `self`.
    ///
    /// `Failed` is retry-eligible, so it keeps an edge back to `Queued`.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Failed => &[Self::Queued],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// `Completed` and `Cancelled` never change again. `Failed` does not
    /// count: it can still be retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the job has stopped running, successfully or not.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Input for creating a job. Validation happens upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub job_id: JobId,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: GenerationType,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub batch_id: Option<String>,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: GenerationType,
    pub prompt: String,
    pub negative_prompt: String,
    pub parameters: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub assigned_backend_id: Option<String>,
    pub progress_percent: u8,
    pub batch_id: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a job in the `Queued` state.
    pub fn new(input: NewJob, now: Timestamp) -> Self {
        Self {
            id: input.job_id,
            clip_id: input.clip_id,
            project_id: input.project_id,
            generation_type: input.generation_type,
            prompt: input.prompt,
            negative_prompt: input.negative_prompt,
            parameters: input.parameters,
            priority: input.priority,
            status: JobStatus::Queued,
            retry_count: 0,
            error: None,
            assigned_backend_id: None,
            progress_percent: 0,
            batch_id: input.batch_id,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    /// Move to `to`, or fail with [`CoreError::InvalidStateTransition`].
    pub fn transition(&mut self, to: JobStatus, action: &'static str) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(CoreError::InvalidStateTransition {
                job_id: self.id.clone(),
                status: self.status,
                action,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `queued -> processing` on dispatch to `backend_id`.
    pub fn start(&mut self, backend_id: &str, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing, "dispatch")?;
        self.assigned_backend_id = Some(backend_id.to_string());
        self.started_at = Some(now.max(self.created_at));
        self.progress_percent = 0;
        Ok(())
    }

    /// `processing -> completed` with the produced asset reference.
    pub fn complete(&mut self, result: serde_json::Value, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed, "complete")?;
        self.result = Some(result);
        self.progress_percent = 100;
        self.completed_at = Some(self.finish_time(now));
        Ok(())
    }

    /// `processing -> failed` with an error message.
    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed, "fail")?;
        self.error = Some(error.into());
        self.completed_at = Some(self.finish_time(now));
        Ok(())
    }

    /// `queued|processing -> cancelled`.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Cancelled, "cancel")?;
        self.completed_at = Some(self.finish_time(now));
        Ok(())
    }

    /// `failed -> queued`, clearing everything left over from the failed run.
    pub fn requeue_for_retry(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Queued, "retry")?;
        self.retry_count += 1;
        self.error = None;
        self.result = None;
        self.assigned_backend_id = None;
        self.progress_percent = 0;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    /// Update progress reported by a backend. Only meaningful while processing.
    pub fn set_progress(&mut self, percent: u8) {
        if self.status == JobStatus::Processing {
            self.progress_percent = percent.min(100);
        }
    }

    /// Keep `completed_at >= started_at >= created_at` even if the wall clock steps back.
    fn finish_time(&self, now: Timestamp) -> Timestamp {
        let floor = self.started_at.unwrap_or(self.created_at);
        now.max(floor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
