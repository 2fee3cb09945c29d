//! `HttpWorkerBackend` against a fake worker served by axum on a random port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use genqueue_backend::http::HttpWorkerBackend;
use genqueue_core::backend::{BackendError, BackendHandle, BackendPoll, WorkerBackend};
use genqueue_core::job::{GenerationType, Job, NewJob};

#[derive(Clone, Default)]
struct FakeWorker {
    /// handle -> status body returned by `GET /jobs/{handle}`.
    jobs: Arc<Mutex<HashMap<String, Value>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn submit(State(w): State<FakeWorker>, Json(body): Json<Value>) -> Json<Value> {
    let handle = format!("h-{}", body["job_id"].as_str().unwrap_or("?"));
    w.jobs
        .lock()
        .unwrap()
        .insert(handle.clone(), json!({"status": "running", "progress": 42.5}));
    w.received.lock().unwrap().push(body);
    Json(json!({ "handle": handle }))
}

async fn status(
    State(w): State<FakeWorker>,
    Path(handle): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    w.jobs
        .lock()
        .unwrap()
        .get(&handle)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn cancel(State(w): State<FakeWorker>, Path(handle): Path<String>) -> StatusCode {
    match w.jobs.lock().unwrap().remove(&handle) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn spawn_worker() -> (String, FakeWorker) {
    let worker = FakeWorker::default();
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/jobs", post(submit))
        .route("/jobs/{handle}", get(status).delete(cancel))
        .with_state(worker.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), worker)
}

fn job(id: &str) -> Job {
    Job::new(
        NewJob {
            job_id: id.to_string(),
            clip_id: 3,
            project_id: 9,
            generation_type: GenerationType::TalkingHead,
            prompt: "say hello".to_string(),
            negative_prompt: String::new(),
            priority: 0,
            parameters: json!({"voice": "alto"}),
            batch_id: None,
        },
        Utc::now(),
    )
}

// ---------------------------------------------------------------------------
// Submit / poll / cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_poll_complete() {
    let (url, worker) = spawn_worker().await;
    let backend = HttpWorkerBackend::new("gpu-1", url).unwrap();
    assert_eq!(backend.id(), "gpu-1");

    let handle = backend.submit(&job("j1")).await.unwrap();
    assert_eq!(handle.as_str(), "h-j1");
    let sent = worker.received.lock().unwrap()[0].clone();
    assert_eq!(sent["generation_type"], "talking_head");
    assert_eq!(sent["parameters"]["voice"], "alto");

    assert_eq!(
        backend.poll(&handle).await.unwrap(),
        BackendPoll::Pending { progress: Some(42) }
    );

    worker.jobs.lock().unwrap().insert(
        "h-j1".to_string(),
        json!({"status": "completed", "result": {"uri": "s3://out/j1.mp4"}}),
    );
    assert_eq!(
        backend.poll(&handle).await.unwrap(),
        BackendPoll::Completed(json!({"uri": "s3://out/j1.mp4"}))
    );
}

#[tokio::test]
async fn failed_status_carries_error() {
    let (url, worker) = spawn_worker().await;
    let backend = HttpWorkerBackend::new("gpu-1", url).unwrap();
    let handle = backend.submit(&job("j2")).await.unwrap();

    worker.jobs.lock().unwrap().insert(
        "h-j2".to_string(),
        json!({"status": "failed", "error": "CUDA out of memory"}),
    );
    assert_eq!(
        backend.poll(&handle).await.unwrap(),
        BackendPoll::Failed("CUDA out of memory".to_string())
    );
}

#[tokio::test]
async fn cancel_and_unknown_handle() {
    let (url, _worker) = spawn_worker().await;
    let backend = HttpWorkerBackend::new("gpu-1", url).unwrap();
    let handle = backend.submit(&job("j3")).await.unwrap();

    backend.cancel(&handle).await.unwrap();
    assert_matches!(backend.poll(&handle).await, Err(BackendError::UnknownHandle(h)) if h == "h-j3");
    assert_matches!(
        backend.cancel(&BackendHandle::new("nope")).await,
        Err(BackendError::UnknownHandle(_))
    );
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reflects_reachability() {
    let (url, _worker) = spawn_worker().await;
    assert!(HttpWorkerBackend::new("up", url).unwrap().health().await);

    // Nothing listens on port 9 (discard) on a test host.
    let down = HttpWorkerBackend::new("down", "http://127.0.0.1:9").unwrap();
    assert!(!down.health().await);
    assert_matches!(down.submit(&job("j4")).await, Err(BackendError::Unavailable(_)));
}
