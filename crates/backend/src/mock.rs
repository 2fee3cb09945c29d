//! In-process backend with scripted behaviour.
//!
//! Used for `mock://` entries in `WORKER_BACKENDS` and throughout the test
//! suites. Jobs either finish on their own after a number of polls or wait
//! for the test to settle them with [`MockBackend::complete_job`] /
//! [`MockBackend::fail_job`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use genqueue_core::backend::{BackendError, BackendHandle, BackendPoll, WorkerBackend};
use genqueue_core::job::{GenerationType, Job};
use genqueue_core::types::JobId;

/// How submitted jobs progress without outside help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehaviour {
    /// Stay pending until settled explicitly.
    Manual,
    /// Complete on the n-th poll.
    CompleteAfterPolls(u32),
    /// Fail with the message on the n-th poll.
    FailAfterPolls(u32, String),
}

/// How `submit` responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Accept,
    Reject,
    Unavailable,
}

#[derive(Debug)]
struct MockJob {
    job_id: JobId,
    generation_type: GenerationType,
    polls: u32,
    progress: Option<u8>,
    outcome: Option<BackendPoll>,
}

#[derive(Debug)]
struct MockState {
    jobs: HashMap<String, MockJob>,
    next_handle: u64,
    submitted: Vec<JobId>,
    cancelled: Vec<JobId>,
    healthy: bool,
    submit_mode: SubmitMode,
    fail_polls: bool,
}

pub struct MockBackend {
    id: String,
    behaviour: MockBehaviour,
    state: Mutex<MockState>,
}

impl MockBackend {
    /// A healthy backend whose jobs wait to be settled manually.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_behaviour(id, MockBehaviour::Manual)
    }

    pub fn with_behaviour(id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            id: id.into(),
            behaviour,
            state: Mutex::new(MockState {
                jobs: HashMap::new(),
                next_handle: 0,
                submitted: Vec::new(),
                cancelled: Vec::new(),
                healthy: true,
                submit_mode: SubmitMode::Accept,
                fail_polls: false,
            }),
        }
    }

    fn result_for(&self, handle: &str, job: &MockJob) -> serde_json::Value {
        let ext = match job.generation_type {
            GenerationType::Image | GenerationType::FaceOp => "png",
            GenerationType::Video | GenerationType::TalkingHead => "mp4",
        };
        serde_json::json!({
            "backend": self.id,
            "handle": handle,
            "uri": format!("mock://{}/{}.{}", self.id, job.job_id, ext),
        })
    }

    /// Settle a pending job successfully. `None` uses the default result.
    /// Returns `false` if the job was never submitted here.
    pub async fn complete_job(&self, job_id: &str, result: Option<serde_json::Value>) -> bool {
        let mut state = self.state.lock().await;
        let Some((handle, job)) = state.jobs.iter_mut().find(|(_, j)| j.job_id == job_id) else {
            return false;
        };
        let result = result.unwrap_or_else(|| self.result_for(handle, job));
        job.outcome = Some(BackendPoll::Completed(result));
        true
    }

    pub async fn fail_job(&self, job_id: &str, message: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        match state.jobs.values_mut().find(|j| j.job_id == job_id) {
            Some(job) => {
                job.outcome = Some(BackendPoll::Failed(message.into()));
                true
            }
            None => false,
        }
    }

    pub async fn set_progress(&self, job_id: &str, percent: u8) -> bool {
        let mut state = self.state.lock().await;
        match state.jobs.values_mut().find(|j| j.job_id == job_id) {
            Some(job) => {
                job.progress = Some(percent);
                true
            }
            None => false,
        }
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.state.lock().await.healthy = healthy;
    }

    pub async fn set_submit_mode(&self, mode: SubmitMode) {
        self.state.lock().await.submit_mode = mode;
    }

    /// Make every poll fail with [`BackendError::Unavailable`].
    pub async fn set_poll_failures(&self, fail: bool) {
        self.state.lock().await.fail_polls = fail;
    }

    /// Job ids in submission order, including resubmissions.
    pub async fn submitted_job_ids(&self) -> Vec<JobId> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn cancelled_job_ids(&self) -> Vec<JobId> {
        self.state.lock().await.cancelled.clone()
    }
}

#[async_trait]
impl WorkerBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(&self, job: &Job) -> Result<BackendHandle, BackendError> {
        let mut state = self.state.lock().await;
        match state.submit_mode {
            SubmitMode::Accept => {}
            SubmitMode::Reject => {
                return Err(BackendError::Rejected(format!("{} refused job {}", self.id, job.id)))
            }
            SubmitMode::Unavailable => {
                return Err(BackendError::Unavailable(format!("{} is offline", self.id)))
            }
        }

        state.next_handle += 1;
        let handle = format!("{}-{}", self.id, state.next_handle);
        // A resubmitted job replaces its earlier run.
        state.jobs.retain(|_, j| j.job_id != job.id);
        state.jobs.insert(
            handle.clone(),
            MockJob {
                job_id: job.id.clone(),
                generation_type: job.generation_type,
                polls: 0,
                progress: None,
                outcome: None,
            },
        );
        state.submitted.push(job.id.clone());
        Ok(BackendHandle::new(handle))
    }

    async fn poll(&self, handle: &BackendHandle) -> Result<BackendPoll, BackendError> {
        let mut state = self.state.lock().await;
        if state.fail_polls {
            return Err(BackendError::Unavailable(format!("{} is not responding", self.id)));
        }
        let job = state
            .jobs
            .get_mut(handle.as_str())
            .ok_or_else(|| BackendError::UnknownHandle(handle.to_string()))?;

        if let Some(outcome) = &job.outcome {
            return Ok(outcome.clone());
        }
        job.polls += 1;
        let polls = job.polls;
        let outcome = match &self.behaviour {
            MockBehaviour::CompleteAfterPolls(n) if polls >= *n => {
                Some(BackendPoll::Completed(self.result_for(handle.as_str(), job)))
            }
            MockBehaviour::FailAfterPolls(n, message) if polls >= *n => {
                Some(BackendPoll::Failed(message.clone()))
            }
            _ => None,
        };
        match outcome {
            Some(outcome) => {
                job.outcome = Some(outcome.clone());
                Ok(outcome)
            }
            None => Ok(BackendPoll::Pending {
                progress: job.progress,
            }),
        }
    }

    async fn cancel(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(handle.as_str())
            .ok_or_else(|| BackendError::UnknownHandle(handle.to_string()))?;
        if job.outcome.is_none() {
            job.outcome = Some(BackendPoll::Failed("Cancelled".to_string()));
        }
        let job_id = job.job_id.clone();
        state.cancelled.push(job_id);
        Ok(())
    }

    async fn health(&self) -> bool {
        self.state.lock().await.healthy
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use genqueue_core::job::NewJob;

    use super::*;

    fn job(id: &str, generation_type: GenerationType) -> Job {
        Job::new(
            NewJob {
                job_id: id.to_string(),
                clip_id: 1,
                project_id: 1,
                generation_type,
                prompt: "p".to_string(),
                negative_prompt: String::new(),
                priority: 0,
                parameters: serde_json::json!({}),
                batch_id: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn manual_jobs_wait_for_settlement() {
        let backend = MockBackend::new("m");
        let handle = backend.submit(&job("j1", GenerationType::Image)).await.unwrap();

        backend.set_progress("j1", 30).await;
        assert_eq!(
            backend.poll(&handle).await.unwrap(),
            BackendPoll::Pending { progress: Some(30) }
        );

        assert!(backend.complete_job("j1", None).await);
        let BackendPoll::Completed(result) = backend.poll(&handle).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(result["uri"], "mock://m/j1.png");
        assert!(!backend.complete_job("nope", None).await);
    }

    #[tokio::test]
    async fn scripted_behaviours() {
        let done = MockBackend::with_behaviour("d", MockBehaviour::CompleteAfterPolls(2));
        let h = done.submit(&job("v", GenerationType::Video)).await.unwrap();
        assert_matches!(done.poll(&h).await, Ok(BackendPoll::Pending { .. }));
        assert_matches!(done.poll(&h).await, Ok(BackendPoll::Completed(v)) if v["uri"] == "mock://d/v.mp4");

        let broken = MockBackend::with_behaviour("b", MockBehaviour::FailAfterPolls(1, "oom".into()));
        let h = broken.submit(&job("x", GenerationType::Image)).await.unwrap();
        assert_eq!(broken.poll(&h).await.unwrap(), BackendPoll::Failed("oom".into()));
    }

    #[tokio::test]
    async fn submit_modes_and_cancel() {
        let backend = MockBackend::new("m");
        backend.set_submit_mode(SubmitMode::Unavailable).await;
        assert_matches!(
            backend.submit(&job("a", GenerationType::Image)).await,
            Err(BackendError::Unavailable(_))
        );
        backend.set_submit_mode(SubmitMode::Reject).await;
        assert_matches!(
            backend.submit(&job("a", GenerationType::Image)).await,
            Err(BackendError::Rejected(_))
        );

        backend.set_submit_mode(SubmitMode::Accept).await;
        let h = backend.submit(&job("a", GenerationType::Image)).await.unwrap();
        backend.cancel(&h).await.unwrap();
        assert_eq!(backend.cancelled_job_ids().await, vec!["a"]);
        assert_matches!(backend.poll(&h).await, Ok(BackendPoll::Failed(_)));

        let unknown = BackendHandle::new("missing");
        assert_matches!(backend.poll(&unknown).await, Err(BackendError::UnknownHandle(_)));
    }
}
