#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use genqueue_api::config::{LogFormat, ServerConfig};
use genqueue_api::router::build_app_router;
use genqueue_api::state::AppState;
use genqueue_backend::mock::MockBackend;
use genqueue_core::clip::ClipRecord;
use genqueue_core::job::JobStatus;
use genqueue_core::worker_pool::BackendRegistration;
use genqueue_pipeline::batch::BatchGenerator;
use genqueue_pipeline::config::QueueConfig;
use genqueue_pipeline::gallery::GalleryManager;
use genqueue_pipeline::memory_store::MemoryClipStore;
use genqueue_pipeline::queue::QueueManager;
use genqueue_pipeline::service::GenerationService;

pub const MOCK_BACKEND_ID: &str = "mock-a";

/// Clip 7 in project 1 carries a stored prompt.
pub const CLIP_ID: i64 = 7;
pub const PROJECT_ID: i64 = 1;

/// Test configuration: no database, no configured backends. Backends are
/// registered by [`build_test_app`] directly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        backends: Vec::new(),
        queue: QueueConfig {
            poll_interval: Duration::from_millis(10),
            ..QueueConfig::default()
        },
        health_check_interval: Duration::from_secs(30),
        log_format: LogFormat::Text,
    }
}

/// A router plus handles onto the live pipeline behind it.
///
/// The dispatch loop is not running; tests call
/// [`QueueManager::dispatch_ready`] when they need jobs started.
pub struct TestApp {
    pub router: Router,
    pub queue: Arc<QueueManager>,
    pub backend: Arc<MockBackend>,
    pub clips: Arc<MemoryClipStore>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with all middleware layers, backed by
/// a manual [`MockBackend`] and an in-memory clip store.
pub async fn build_test_app() -> TestApp {
    let config = test_config();

    let queue = QueueManager::new(config.queue.clone(), Arc::new(GalleryManager::new()));
    let backend = Arc::new(MockBackend::new(MOCK_BACKEND_ID));
    queue
        .register_backend(BackendRegistration::new(MOCK_BACKEND_ID), backend.clone())
        .await
        .unwrap();

    let clips = Arc::new(MemoryClipStore::new());
    clips
        .insert_clip(ClipRecord {
            id: CLIP_ID,
            project_id: PROJECT_ID,
            prompt: Some("a lighthouse at dusk".to_string()),
            negative_prompt: None,
        })
        .await;

    let batches = Arc::new(BatchGenerator::new(Arc::clone(&queue)));
    let service = Arc::new(GenerationService::new(
        Arc::clone(&queue),
        batches,
        clips.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        service,
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        queue,
        backend,
        clips,
    }
}

/// A minimal valid submission body for the stored clip.
pub fn generation_body(job_id: &str) -> serde_json::Value {
    serde_json::json!({
        "job_id": job_id,
        "clip_id": CLIP_ID,
        "project_id": PROJECT_ID,
        "generation_type": "image",
    })
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_STEPS: usize = 300;

/// Wait until the queue reports `status` for `job_id`.
pub async fn wait_for_status(queue: &QueueManager, job_id: &str, status: JobStatus) {
    for _ in 0..WAIT_STEPS {
        if queue.get_job(job_id).await.map(|j| j.status).ok() == Some(status) {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("job {job_id} never reached {status}");
}

/// Wait until the mock backend has accepted `job_id`.
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
    panic!("job {job_id} was never cancelled on the backend");
}
