#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use genqueue_backend::mock::MockBackend;
use genqueue_core::job::{GenerationType, Job, JobStatus, NewJob};
use genqueue_core::worker_pool::BackendRegistration;
use genqueue_pipeline::backoff::BackoffConfig;
use genqueue_pipeline::config::QueueConfig;
use genqueue_pipeline::gallery::GalleryManager;
use genqueue_pipeline::queue::QueueManager;

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_STEPS: usize = 300;

/// Millisecond-scale polling so tests settle quickly.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval: Duration::from_millis(10),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        },
        ..QueueConfig::default()
    }
}

pub fn queue_with(config: QueueConfig) -> Arc<QueueManager> {
    QueueManager::new(config, Arc::new(GalleryManager::new()))
}

pub fn queue() -> Arc<QueueManager> {
    queue_with(fast_config())
}

pub fn new_job(id: &str, priority: i32) -> NewJob {
    typed_job(id, priority, GenerationType::Image)
}

pub fn typed_job(id: &str, priority: i32, generation_type: GenerationType) -> NewJob {
    NewJob {
        job_id: id.to_string(),
        clip_id: 1,
        project_id: 1,
        generation_type,
        prompt: "a red fox in snow".to_string(),
        negative_prompt: String::new(),
        priority,
        parameters: serde_json::json!({}),
        batch_id: None,
    }
}

/// Register `backend` with no capability or capacity limits.
pub async fn register(queue: &QueueManager, backend: &Arc<MockBackend>) {
    register_with(queue, backend, BackendRegistration::new(backend_id(backend))).await;
}

pub async fn register_with(
    queue: &QueueManager,
    backend: &Arc<MockBackend>,
    registration: BackendRegistration,
) {
    queue
        .register_backend(registration, backend.clone())
        .await
        .unwrap();
}

fn backend_id(backend: &MockBackend) -> String {
    use genqueue_core::backend::WorkerBackend;
    backend.id().to_string()
}

pub async fn wait_for_status(queue: &QueueManager, job_id: &str, status: JobStatus) -> Job {
    for _ in 0..WAIT_STEPS {
        if let Ok(job) = queue.get_job(job_id).await {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    let current = queue.get_job(job_id).await.map(|j| j.status);
    panic!("job {job_id} never reached {status}, last seen {current:?}");
}

pub async fn wait_for_submission(backend: &MockBackend, job_id: &str) {
    for _ in 0..WAIT_STEPS {
        if backend.submitted_job_ids().await.iter().any(|id| id == job_id) {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("job {job_id} was never submitted");
}

pub async fn wait_for_backend_cancel(backend: &MockBackend, job_id: &str) {
    for _ in 0..WAIT_STEPS {
        if backend.cancelled_job_ids().await.iter().any(|id| id == job_id) {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("backend never saw a cancel for {job_id}");
}

/// Every live id is in exactly one container.
pub async fn assert_single_container(queue: &QueueManager) {
    let pending = queue.pending_job_ids().await;
    let in_flight = queue.in_flight_job_ids().await;
    for id in &pending {
        assert!(!in_flight.contains(id), "{id} is both pending and in flight");
    }
    assert_eq!(pending.len() + in_flight.len(), queue.list_jobs(None).await.len());
}
