use std::sync::Arc;

use genqueue_pipeline::batch::BatchGenerator;
use genqueue_pipeline::gallery::GalleryManager;
use genqueue_pipeline::queue::QueueManager;
use genqueue_pipeline::service::GenerationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub service: Arc<GenerationService>,
    /// Present only when `DATABASE_URL` is configured.
    pub pool: Option<genqueue_db::DbPool>,
}

impl AppState {
    pub fn queue(&self) -> &Arc<QueueManager> {
        self.service.queue()
    }

    pub fn batches(&self) -> &Arc<BatchGenerator> {
        self.service.batches()
    }

    pub fn gallery(&self) -> &Arc<GalleryManager> {
        self.service.queue().gallery()
    }
}
