//! Wiring of the generation pipeline from [`ServerConfig`].

use std::sync::Arc;

use genqueue_backend::http::HttpWorkerBackend;
use genqueue_backend::mock::{MockBackend, MockBehaviour};
use genqueue_core::backend::WorkerBackend;
use genqueue_core::clip::ClipStore;
use genqueue_core::error::CoreError;
use genqueue_pipeline::batch::BatchGenerator;
use genqueue_pipeline::gallery::GalleryManager;
use genqueue_pipeline::queue::QueueManager;
use genqueue_pipeline::service::GenerationService;

use crate::config::{BackendSpec, BackendTarget, ServerConfig};

/// Polls before a configured `mock://` backend finishes a job.
const MOCK_POLLS_TO_COMPLETE: u32 = 3;

/// Build the adapter for one configured backend.
pub fn build_backend(spec: &BackendSpec) -> Result<Arc<dyn WorkerBackend>, CoreError> {
    let id = spec.registration.id.clone();
    Ok(match &spec.target {
        BackendTarget::Mock => Arc::new(MockBackend::with_behaviour(
            id,
            MockBehaviour::CompleteAfterPolls(MOCK_POLLS_TO_COMPLETE),
        )),
        BackendTarget::Http(url) => Arc::new(
            HttpWorkerBackend::new(id, url.clone())
                .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?,
        ),
    })
}

/// Create the queue, register every configured backend, and assemble the
/// generation service around `clips`.
pub async fn build_service(
    config: &ServerConfig,
    clips: Arc<dyn ClipStore>,
) -> Result<Arc<GenerationService>, CoreError> {
    let queue = QueueManager::new(config.queue.clone(), Arc::new(GalleryManager::new()));
    for spec in &config.backends {
        let backend = build_backend(spec)?;
        queue
            .register_backend(spec.registration.clone(), backend)
            .await?;
    }
    let batches = Arc::new(BatchGenerator::new(Arc::clone(&queue)));
    Ok(Arc::new(GenerationService::new(queue, batches, clips)))
}
