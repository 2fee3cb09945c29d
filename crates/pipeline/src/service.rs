//! Request-facing façade over the queue.
//!
//! [`GenerationService`] validates raw requests, resolves the target clip
//! through a [`ClipStore`], and hands fully-formed [`NewJob`]s to the
//! queue or the batch generator. It also owns the result persistence loop
//! that writes completed jobs back to the clip store.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use genqueue_core::batch::Batch;
use genqueue_core::clip::ClipStore;
use genqueue_core::error::CoreError;
use genqueue_core::job::{GenerationType, Job, NewJob};
use genqueue_core::scheduling::{validate_priority, PRIORITY_NORMAL};
use genqueue_core::types::{DbId, JobId};

use crate::batch::BatchGenerator;
use crate::queue::{validate_job_id, QueueManager};

/// Maximum prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 10_000;

/// Maximum number of jobs in one batch request.
pub const MAX_BATCH_SIZE: usize = 256;

/// A single generation request as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    /// Caller-chosen id. A uuid is generated when absent.
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub clip_id: DbId,
    pub project_id: DbId,
    pub generation_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub jobs: Vec<GenerationRequest>,
    #[serde(default)]
    pub fail_fast: bool,
}

pub struct GenerationService {
    queue: Arc<QueueManager>,
    batches: Arc<BatchGenerator>,
    clips: Arc<dyn ClipStore>,
}

impl GenerationService {
    pub fn new(
        queue: Arc<QueueManager>,
        batches: Arc<BatchGenerator>,
        clips: Arc<dyn ClipStore>,
    ) -> Self {
        Self {
            queue,
            batches,
            clips,
        }
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn batches(&self) -> &Arc<BatchGenerator> {
        &self.batches
    }

    pub async fn submit(&self, request: GenerationRequest) -> Result<Job, CoreError> {
        let job = self.prepare(request).await?;
        self.queue.add_job(job).await
    }

    /// Validate every item first, then submit the batch atomically.
    pub async fn submit_batch(&self, request: BatchRequest) -> Result<Batch, CoreError> {
        if request.jobs.len() > MAX_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "Batch must not exceed {MAX_BATCH_SIZE} jobs, got {}",
                request.jobs.len()
            )));
        }
        let mut jobs = Vec::with_capacity(request.jobs.len());
        for item in request.jobs {
            jobs.push(self.prepare(item).await?);
        }
        self.batches.submit_batch(jobs, request.fail_fast).await
    }

    /// Turn a raw request into a [`NewJob`].
    async fn prepare(&self, request: GenerationRequest) -> Result<NewJob, CoreError> {
        let generation_type = GenerationType::from_str(&request.generation_type)?;
        let priority = request.priority.unwrap_or(PRIORITY_NORMAL);
        validate_priority(priority)?;

        let parameters = match request.parameters {
            None => serde_json::Value::Object(Default::default()),
            Some(value @ serde_json::Value::Object(_)) => value,
            Some(_) => {
                return Err(CoreError::Validation(
                    "parameters must be a JSON object".to_string(),
                ))
            }
        };

        let job_id = match request.job_id {
            Some(id) => {
                validate_job_id(&id)?;
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let clip = self
            .clips
            .find_clip(request.project_id, request.clip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "Clip",
                id: request.clip_id.to_string(),
            })?;
        if clip.project_id != request.project_id {
            return Err(CoreError::Validation(format!(
                "Clip {} does not belong to project {}",
                clip.id, request.project_id
            )));
        }

        let prompt = non_empty(request.prompt)
            .or_else(|| non_empty(clip.prompt))
            .unwrap_or_default();
        let negative_prompt = non_empty(request.negative_prompt)
            .or_else(|| non_empty(clip.negative_prompt))
            .unwrap_or_default();

        if generation_type.requires_prompt() && prompt.is_empty() {
            return Err(CoreError::Validation(format!(
                "A prompt is required for {generation_type} generation"
            )));
        }
        for (field, text) in [("prompt", &prompt), ("negative_prompt", &negative_prompt)] {
            if text.chars().count() > MAX_PROMPT_LEN {
                return Err(CoreError::Validation(format!(
                    "{field} must not exceed {MAX_PROMPT_LEN} characters"
                )));
            }
        }

        Ok(NewJob {
            job_id,
            clip_id: clip.id,
            project_id: request.project_id,
            generation_type,
            prompt,
            negative_prompt,
            priority,
            parameters,
            batch_id: None,
        })
    }

    /// Persist completed results through the clip store.
    ///
    /// Takes the receiver from [`QueueManager::completed_results`] and exits
    /// once the channel is closed and every buffered job has been saved.
    pub async fn run_result_persistence(
        clips: Arc<dyn ClipStore>,
        mut results: mpsc::UnboundedReceiver<Job>,
    ) {
        let mut persisted = 0usize;
        while let Some(job) = results.recv().await {
            match clips.save_generation_result(&job).await {
                Ok(()) => {
                    persisted += 1;
                    tracing::debug!(job_id = %job.id, clip_id = job.clip_id, "Generation result persisted");
                }
                Err(e) => tracing::error!(
                    job_id = %job.id,
                    clip_id = job.clip_id,
                    error = %e,
                    "Failed to persist generation result",
                ),
            }
        }
        tracing::info!(persisted, "Result channel closed, result persistence shutting down");
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use genqueue_core::clip::ClipRecord;

    use super::*;
    use crate::config::QueueConfig;
    use crate::gallery::GalleryManager;
    use crate::memory_store::MemoryClipStore;

    async fn service() -> GenerationService {
        let queue = QueueManager::new(QueueConfig::default(), Arc::new(GalleryManager::new()));
        let batches = Arc::new(BatchGenerator::new(Arc::clone(&queue)));
        let clips = MemoryClipStore::new();
        clips
            .insert_clip(ClipRecord {
                id: 7,
                project_id: 1,
                prompt: Some("stored prompt".to_string()),
                negative_prompt: Some("blurry".to_string()),
            })
            .await;
        GenerationService::new(queue, batches, Arc::new(clips))
    }

    fn request(generation_type: &str) -> GenerationRequest {
        GenerationRequest {
            job_id: None,
            clip_id: 7,
            project_id: 1,
            generation_type: generation_type.to_string(),
            prompt: None,
            negative_prompt: None,
            priority: None,
            parameters: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_clip_prompts_and_defaults() {
        let svc = service().await;
        let job = svc.submit(request("image")).await.unwrap();

        assert_eq!(job.prompt, "stored prompt");
        assert_eq!(job.negative_prompt, "blurry");
        assert_eq!(job.priority, PRIORITY_NORMAL);
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
        assert_eq!(job.parameters, serde_json::json!({}));
    }

    #[tokio::test]
    async fn request_prompt_wins_over_stored_prompt() {
        let svc = service().await;
        let job = svc
            .submit(GenerationRequest {
                job_id: Some("custom".to_string()),
                prompt: Some("from request".to_string()),
                ..request("video")
            })
            .await
            .unwrap();
        assert_eq!(job.id, "custom");
        assert_eq!(job.prompt, "from request");
    }

    #[tokio::test]
    async fn rejects_invalid_requests() {
        let svc = service().await;

        assert_matches!(svc.submit(request("painting")).await, Err(CoreError::Validation(_)));
        assert_matches!(
            svc.submit(GenerationRequest { priority: Some(99), ..request("image") }).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            svc.submit(GenerationRequest {
                parameters: Some(serde_json::json!([1, 2])),
                ..request("image")
            })
            .await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            svc.submit(GenerationRequest {
                prompt: Some("x".repeat(MAX_PROMPT_LEN + 1)),
                ..request("image")
            })
            .await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn unknown_clip_and_wrong_project() {
        let svc = service().await;
        assert_matches!(
            svc.submit(GenerationRequest { clip_id: 404, ..request("image") }).await,
            Err(CoreError::NotFound { entity: "Clip", .. })
        );
        assert_matches!(
            svc.submit(GenerationRequest { project_id: 2, ..request("image") }).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn face_ops_need_no_prompt() {
        let queue = QueueManager::new(QueueConfig::default(), Arc::new(GalleryManager::new()));
        let batches = Arc::new(BatchGenerator::new(Arc::clone(&queue)));
        let svc = GenerationService::new(queue, batches, Arc::new(MemoryClipStore::permissive()));

        let job = svc.submit(request("face_op")).await.unwrap();
        assert!(job.prompt.is_empty());
        assert_matches!(svc.submit(request("image")).await, Err(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_validation_happens_before_any_submit() {
        let svc = service().await;
        let err = svc
            .submit_batch(BatchRequest {
                jobs: vec![request("image"), request("nope")],
                fail_fast: false,
            })
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
        assert!(svc.queue().pending_job_ids().await.is_empty());

        let batch = svc
            .submit_batch(BatchRequest {
                jobs: vec![request("image"), request("video")],
                fail_fast: true,
            })
            .await
            .unwrap();
        assert_eq!(batch.job_ids.len(), 2);
        assert!(batch.fail_fast);
    }

    #[tokio::test]
    async fn persistence_loop_drains_after_close() {
        let store = Arc::new(MemoryClipStore::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut job = Job::new(
            NewJob {
                job_id: "done".to_string(),
                clip_id: 7,
                project_id: 1,
                generation_type: GenerationType::Image,
                prompt: "p".to_string(),
                negative_prompt: String::new(),
                priority: 0,
                parameters: serde_json::json!({}),
                batch_id: None,
            },
            chrono::Utc::now(),
        );
        job.start("b", chrono::Utc::now()).unwrap();
        job.complete(serde_json::json!({"uri": "mock://b/done.png"}), chrono::Utc::now())
            .unwrap();

        // Buffered before the loop starts and before the sender goes away.
        tx.send(job).unwrap();
        drop(tx);
        GenerationService::run_result_persistence(store.clone(), rx).await;

        let saved = store.saved_results().await;
        assert_eq!(saved.len(), 1);
        assert!(saved.contains_key("done"));
    }
}
