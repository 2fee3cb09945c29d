//! Generation job queue.
//!
//! [`QueueManager`] owns the pending collection (ordered by
//! [`DispatchKey`]), the in-flight/terminal map, the load tracker, and the
//! backend registry, all behind one [`tokio::sync::Mutex`]. Moving a job
//! between containers always happens inside a single critical section, so
//! a live job id is in exactly one of them at any time. No backend I/O runs
//! while the lock is held.
//!
//! The dispatch loop and per-job execution tasks live in
//! [`crate::dispatcher`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use genqueue_core::backend::WorkerBackend;
use genqueue_core::error::CoreError;
use genqueue_core::job::{Job, JobStatus, NewJob};
use genqueue_core::scheduling::{validate_priority, DispatchKey};
use genqueue_core::types::JobId;
use genqueue_core::worker_pool::BackendRegistration;

use crate::config::QueueConfig;
use crate::events::QueueEvent;
use crate::gallery::GalleryManager;
use crate::load::{BackendLoad, LoadTracker};

/// Maximum length of a job id.
const MAX_JOB_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Links an in-flight job to the execution task running it.
#[derive(Debug)]
pub(crate) struct DispatchTicket {
    /// Unique per dispatch. Outcomes carrying a stale id are discarded.
    pub(crate) dispatch_id: u64,
    /// Fired to ask the execution task to stop and cancel backend work.
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct InFlightEntry {
    pub(crate) job: Job,
    /// Original ordering key, reused when the job is retried.
    pub(crate) key: DispatchKey,
    /// Present only while the job is `processing`.
    pub(crate) ticket: Option<DispatchTicket>,
}

/// Processing and finished jobs, iterated in the order they entered.
#[derive(Default)]
pub(crate) struct InFlightMap {
    entries: BTreeMap<u64, InFlightEntry>,
    index: HashMap<JobId, u64>,
    next_seq: u64,
}

impl InFlightMap {
    /// Append an entry. A re-inserted job moves to the end.
    pub(crate) fn insert(&mut self, entry: InFlightEntry) {
        self.remove(&entry.job.id);
        self.next_seq += 1;
        self.index.insert(entry.job.id.clone(), self.next_seq);
        self.entries.insert(self.next_seq, entry);
    }

    pub(crate) fn remove(&mut self, job_id: &str) -> Option<InFlightEntry> {
        let seq = self.index.remove(job_id)?;
        self.entries.remove(&seq)
    }

    pub(crate) fn get(&self, job_id: &str) -> Option<&InFlightEntry> {
        self.entries.get(self.index.get(job_id)?)
    }

    pub(crate) fn get_mut(&mut self, job_id: &str) -> Option<&mut InFlightEntry> {
        self.entries.get_mut(self.index.get(job_id)?)
    }

    fn contains(&self, job_id: &str) -> bool {
        self.index.contains_key(job_id)
    }

    fn values(&self) -> impl Iterator<Item = &InFlightEntry> {
        self.entries.values()
    }
}

#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) pending: BTreeMap<DispatchKey, Job>,
    pub(crate) pending_index: HashMap<JobId, DispatchKey>,
    pub(crate) in_flight: InFlightMap,
    pub(crate) load: LoadTracker,
    pub(crate) backends: HashMap<String, Arc<dyn WorkerBackend>>,
    pub(crate) next_sequence: u64,
    pub(crate) next_dispatch_id: u64,
    /// Receives every completed job, see [`QueueManager::completed_results`].
    pub(crate) results: Option<mpsc::UnboundedSender<Job>>,
}

impl QueueState {
    fn contains(&self, job_id: &str) -> bool {
        self.pending_index.contains_key(job_id) || self.in_flight.contains(job_id)
    }

    pub(crate) fn insert_pending(&mut self, key: DispatchKey, job: Job) {
        self.pending_index.insert(job.id.clone(), key);
        self.pending.insert(key, job);
    }

    fn remove_pending(&mut self, job_id: &str) -> Option<(DispatchKey, Job)> {
        let key = self.pending_index.remove(job_id)?;
        self.pending.remove(&key).map(|job| (key, job))
    }

    /// Release the load slot and signal the execution task of a processing
    /// entry. No-op for entries without a ticket.
    pub(crate) fn stop_dispatch(&mut self, entry: &mut InFlightEntry) {
        if let Some(ticket) = entry.ticket.take() {
            ticket.cancel.cancel();
            if let Some(backend_id) = entry.job.assigned_backend_id.as_deref() {
                self.load.release(backend_id);
            }
        }
    }

    /// Remove a job from whichever container holds it.
    fn remove(&mut self, job_id: &str) -> Option<Job> {
        if let Some((_, job)) = self.remove_pending(job_id) {
            return Some(job);
        }
        let mut entry = self.in_flight.remove(job_id)?;
        self.stop_dispatch(&mut entry);
        Some(entry.job)
    }

    fn get(&self, job_id: &str) -> Option<&Job> {
        if let Some(key) = self.pending_index.get(job_id) {
            return self.pending.get(key);
        }
        self.in_flight.get(job_id).map(|e| &e.job)
    }

    fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.pending
            .values()
            .chain(self.in_flight.values().map(|e| &e.job))
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Queue-wide counts plus per-backend load.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub backends: Vec<BackendLoad>,
}

// ---------------------------------------------------------------------------
// QueueManager
// ---------------------------------------------------------------------------

/// Owns job lifecycle bookkeeping and the dispatch loop.
///
/// Created once via [`QueueManager::new`]; the returned `Arc` is shared
/// with the batch generator, health monitor, and HTTP handlers.
pub struct QueueManager {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) gallery: Arc<GalleryManager>,
    pub(crate) config: QueueConfig,
    pub(crate) events: broadcast::Sender<QueueEvent>,
    /// Wakes the dispatch loop: new job, freed slot, or healthy backend.
    pub(crate) wake: Notify,
    /// Parent of every execution task's cancellation token.
    pub(crate) shutdown: CancellationToken,
}

impl QueueManager {
    pub fn new(config: QueueConfig, gallery: Arc<GalleryManager>) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            gallery,
            config,
            events,
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn gallery(&self) -> &Arc<GalleryManager> {
        &self.gallery
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Route every job that completes from now on to the returned receiver.
    ///
    /// Unlike [`subscribe`](Self::subscribe), delivery never lags. The
    /// channel closes when [`close_results`](Self::close_results) runs,
    /// which the dispatch loop does on exit. A later call replaces the
    /// earlier receiver.
    pub async fn completed_results(&self) -> mpsc::UnboundedReceiver<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.results = Some(tx);
        rx
    }

    /// Drop the result sender so the receiver drains and ends.
    pub async fn close_results(&self) {
        self.state.lock().await.results = None;
    }

    pub(crate) fn publish(&self, event: QueueEvent) {
        // Zero receivers is fine.
        let _ = self.events.send(event);
    }

    // ---- backends ----

    /// Add a backend to the pool. `registration.id` must match `backend.id()`.
    pub async fn register_backend(
        &self,
        registration: BackendRegistration,
        backend: Arc<dyn WorkerBackend>,
    ) -> Result<(), CoreError> {
        if registration.id != backend.id() {
            return Err(CoreError::Validation(format!(
                "Registration id '{}' does not match backend id '{}'",
                registration.id,
                backend.id()
            )));
        }
        let backend_id = registration.id.clone();
        {
            let mut state = self.state.lock().await;
            state.load.register(registration)?;
            state.backends.insert(backend_id.clone(), backend);
        }
        tracing::info!(backend_id = %backend_id, "Backend registered");
        self.wake.notify_one();
        Ok(())
    }

    /// Update a backend's health flag. Waking the dispatcher when a backend
    /// comes back lets pending jobs move without waiting out the backoff.
    pub async fn set_backend_health(&self, backend_id: &str, healthy: bool) -> Result<(), CoreError> {
        let changed = self.state.lock().await.load.set_health(backend_id, healthy)?;
        if changed {
            if healthy {
                tracing::info!(backend_id, "Backend is healthy");
                self.wake.notify_one();
            } else {
                tracing::warn!(backend_id, "Backend marked unhealthy");
            }
        }
        Ok(())
    }

    /// Load and health of every backend, in registration order.
    pub async fn backends(&self) -> Vec<BackendLoad> {
        self.state.lock().await.load.snapshot()
    }

    /// Registered backend ids, in registration order.
    pub async fn backend_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .load
            .snapshot()
            .into_iter()
            .map(|b| b.backend_id)
            .collect()
    }

    /// Handles for every registered backend.
    pub async fn backend_handles(&self) -> Vec<Arc<dyn WorkerBackend>> {
        let state = self.state.lock().await;
        state
            .load
            .snapshot()
            .iter()
            .filter_map(|b| state.backends.get(&b.backend_id).cloned())
            .collect()
    }

    // ---- job operations ----

    /// Queue a new job.
    ///
    /// Fails with [`CoreError::DuplicateJob`] if the id is already present
    /// in either container.
    pub async fn add_job(&self, input: NewJob) -> Result<Job, CoreError> {
        validate_job_id(&input.job_id)?;
        validate_priority(input.priority)?;

        let job = {
            let mut state = self.state.lock().await;
            if state.contains(&input.job_id) {
                return Err(CoreError::DuplicateJob {
                    job_id: input.job_id,
                });
            }
            let job = Job::new(input, Utc::now());
            state.next_sequence += 1;
            let key = DispatchKey {
                priority: job.priority,
                created_at: job.created_at,
                sequence: state.next_sequence,
            };
            state.insert_pending(key, job.clone());
            job
        };

        tracing::info!(
            job_id = %job.id,
            generation_type = %job.generation_type,
            priority = job.priority,
            "Job queued",
        );
        self.publish(QueueEvent::JobQueued {
            job_id: job.id.clone(),
            priority: job.priority,
        });
        self.wake.notify_one();
        Ok(job)
    }

    /// Move a failed job back to the pending collection.
    ///
    /// The job keeps its original ordering key, so it re-enters ahead of
    /// younger jobs of the same priority.
    pub async fn retry_job(&self, job_id: &str) -> Result<Job, CoreError> {
        let job = {
            let mut state = self.state.lock().await;
            let status = current_status(&state, job_id)?;
            if status != JobStatus::Failed {
                return Err(CoreError::InvalidStateTransition {
                    job_id: job_id.to_string(),
                    status,
                    action: "retry",
                });
            }
            requeue_failed(&mut state, job_id)?
        };

        tracing::info!(job_id, retry_count = job.retry_count, "Job re-queued for retry");
        self.publish(QueueEvent::JobRetried {
            job_id: job.id.clone(),
            retry_count: job.retry_count,
            automatic: false,
        });
        self.wake.notify_one();
        Ok(job)
    }

    /// Cancel a job.
    ///
    /// - `queued`: removed from the pending collection and marked cancelled.
    /// - `processing`: marked cancelled immediately, its load slot released,
    ///   and the backend asked to stop (best-effort, asynchronous).
    /// - `completed` / `cancelled`: no-op, returns the job unchanged.
    /// - `failed`: rejected; retry or delete it instead.
    pub async fn cancel_job(&self, job_id: &str) -> Result<Job, CoreError> {
        let (job, changed) = {
            let mut state = self.state.lock().await;
            let now = Utc::now();

            if let Some((key, mut job)) = state.remove_pending(job_id) {
                job.cancel(now)?;
                state.in_flight.insert(InFlightEntry {
                    job: job.clone(),
                    key,
                    ticket: None,
                });
                (job, true)
            } else {
                let st = &mut *state;
                let entry = st
                    .in_flight
                    .get_mut(job_id)
                    .ok_or_else(|| CoreError::JobNotFound {
                        job_id: job_id.to_string(),
                    })?;
                match entry.job.status {
                    JobStatus::Completed | JobStatus::Cancelled => (entry.job.clone(), false),
                    JobStatus::Processing => {
                        entry.job.cancel(now)?;
                        if let Some(ticket) = entry.ticket.take() {
                            ticket.cancel.cancel();
                            if let Some(backend_id) = entry.job.assigned_backend_id.as_deref() {
                                st.load.release(backend_id);
                            }
                        }
                        (entry.job.clone(), true)
                    }
                    status => {
                        return Err(CoreError::InvalidStateTransition {
                            job_id: job_id.to_string(),
                            status,
                            action: "cancel",
                        })
                    }
                }
            }
        };

        if changed {
            tracing::info!(job_id, "Job cancelled");
            self.publish(QueueEvent::JobCancelled {
                job_id: job.id.clone(),
            });
            self.wake.notify_one();
        }
        Ok(job)
    }

    /// Remove a job from the queue, whatever its status. A processing job
    /// releases its load slot and its backend work is asked to stop.
    pub async fn delete_job(&self, job_id: &str) -> Result<Job, CoreError> {
        let job = self
            .state
            .lock()
            .await
            .remove(job_id)
            .ok_or_else(|| CoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        tracing::info!(job_id, status = %job.status, "Job deleted");
        self.publish(QueueEvent::JobDeleted {
            job_id: job.id.clone(),
        });
        self.wake.notify_one();
        Ok(job)
    }

    /// Remove every job whose status equals `status`, or every job when
    /// `status` is `None`. Returns the number removed.
    ///
    /// Cleared `processing` jobs release their load slot and receive a
    /// best-effort backend cancel so their work is not orphaned.
    pub async fn clear_jobs(&self, status: Option<JobStatus>) -> usize {
        let removed: Vec<Job> = {
            let mut state = self.state.lock().await;
            let ids: Vec<JobId> = state
                .jobs()
                .filter(|job| status.map_or(true, |s| job.status == s))
                .map(|job| job.id.clone())
                .collect();
            ids.iter().filter_map(|id| state.remove(id)).collect()
        };

        tracing::info!(
            deleted_count = removed.len(),
            status_filter = ?status,
            "Cleared jobs",
        );
        for job in &removed {
            self.publish(QueueEvent::JobDeleted {
                job_id: job.id.clone(),
            });
        }
        if !removed.is_empty() {
            self.wake.notify_one();
        }
        removed.len()
    }

    /// Change the priority of a queued job and re-sort it.
    pub async fn update_priority(&self, job_id: &str, priority: i32) -> Result<Job, CoreError> {
        validate_priority(priority)?;
        let mut state = self.state.lock().await;
        let Some((key, mut job)) = state.remove_pending(job_id) else {
            let status = current_status(&state, job_id)?;
            return Err(CoreError::InvalidStateTransition {
                job_id: job_id.to_string(),
                status,
                action: "reprioritize",
            });
        };
        job.priority = priority;
        let key = DispatchKey { priority, ..key };
        state.insert_pending(key, job.clone());
        drop(state);

        tracing::info!(job_id, priority, "Job priority updated");
        self.wake.notify_one();
        Ok(job)
    }

    // ---- reads ----

    pub async fn get_job(&self, job_id: &str) -> Result<Job, CoreError> {
        self.state
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| CoreError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Snapshot of the given jobs, skipping ids that no longer exist.
    pub async fn get_jobs(&self, job_ids: &[JobId]) -> Vec<Job> {
        let state = self.state.lock().await;
        job_ids
            .iter()
            .filter_map(|id| state.get(id).cloned())
            .collect()
    }

    /// All jobs, pending first in dispatch order, then in-flight/terminal
    /// jobs in the order they left the pending collection.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.state
            .lock()
            .await
            .jobs()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect()
    }

    /// Pending job ids in the order they will be dispatched.
    pub async fn pending_job_ids(&self) -> Vec<JobId> {
        self.state
            .lock()
            .await
            .pending
            .values()
            .map(|job| job.id.clone())
            .collect()
    }

    /// Ids held by the in-flight/terminal map.
    pub async fn in_flight_job_ids(&self) -> Vec<JobId> {
        self.state
            .lock()
            .await
            .in_flight
            .values()
            .map(|e| e.job.id.clone())
            .collect()
    }

    pub async fn summary(&self) -> QueueSummary {
        let state = self.state.lock().await;
        let mut summary = QueueSummary {
            total: 0,
            queued: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            backends: state.load.snapshot(),
        };
        for job in state.jobs() {
            summary.total += 1;
            match job.status {
                JobStatus::Queued => summary.queued += 1,
                JobStatus::Processing => summary.processing += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Stop every execution task. Called when the dispatch loop exits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Job ids are non-blank and at most `MAX_JOB_ID_LEN` bytes.
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    if job_id.trim().is_empty() {
        return Err(CoreError::Validation("Job id must not be empty".to_string()));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Job id must not exceed {MAX_JOB_ID_LEN} characters"
        )));
    }
    Ok(())
}

fn current_status(state: &QueueState, job_id: &str) -> Result<JobStatus, CoreError> {
    state
        .get(job_id)
        .map(|job| job.status)
        .ok_or_else(|| CoreError::JobNotFound {
            job_id: job_id.to_string(),
        })
}

/// `failed -> queued`: move the entry from the in-flight map back into the
/// pending collection under its original key.
pub(crate) fn requeue_failed(state: &mut QueueState, job_id: &str) -> Result<Job, CoreError> {
    let mut entry = state
        .in_flight
        .remove(job_id)
        .ok_or_else(|| CoreError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
    if let Err(e) = entry.job.requeue_for_retry() {
        // Put it back untouched so the job is never lost.
        state.in_flight.insert(entry);
        return Err(e);
    }
    let job = entry.job.clone();
    state.insert_pending(entry.key, entry.job);
    Ok(job)
}
