//! Periodic backend health probing.
//!
//! Calls [`WorkerBackend::health`] on every registered backend concurrently
//! and pushes the flags into the load tracker through the queue manager.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use genqueue_core::backend::WorkerBackend;

use crate::queue::QueueManager;

/// Default interval between health sweeps.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Probes slower than this count as unhealthy.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthMonitor {
    queue: Arc<QueueManager>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(queue: Arc<QueueManager>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            probe_timeout: DEFAULT_PROBE_TIMEOUT.min(interval),
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Run health sweeps until `cancel` is triggered. The first sweep runs
    /// immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Backend health monitor started",
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Backend health monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let unhealthy = self.check_all().await;
                    if unhealthy > 0 {
                        tracing::debug!(unhealthy, "Health sweep finished with unhealthy backends");
                    }
                }
            }
        }
    }

    /// Probe every backend once. Returns how many were unhealthy.
    pub async fn check_all(&self) -> usize {
        let backends = self.queue.backend_handles().await;
        let probes = backends.iter().map(|backend| self.probe(backend.as_ref()));
        let results = join_all(probes).await;

        let mut unhealthy = 0;
        for (backend, healthy) in backends.iter().zip(results) {
            if !healthy {
                unhealthy += 1;
            }
            if let Err(e) = self.queue.set_backend_health(backend.id(), healthy).await {
                tracing::error!(backend_id = backend.id(), error = %e, "Failed to record backend health");
            }
        }
        unhealthy
    }

    async fn probe(&self, backend: &dyn WorkerBackend) -> bool {
        match tokio::time::timeout(self.probe_timeout, backend.health()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                tracing::warn!(
                    backend_id = backend.id(),
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Backend health probe timed out",
                );
                false
            }
        }
    }
}
