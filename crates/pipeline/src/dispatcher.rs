//! Dispatch loop and per-job execution tasks.
//!
//! [`QueueManager::run`] is a single long-lived task. Each cycle it moves
//! every pending job that has an eligible backend into the in-flight map
//! (one lock acquisition), then spawns one execution task per dispatched
//! job. Execution tasks submit, poll, and report the outcome back through
//! [`QueueManager::finish`], which ignores outcomes from a dispatch that is
//! no longer current (the job was cancelled, deleted, or cleared meanwhile).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use genqueue_core::backend::{BackendError, BackendHandle, BackendPoll, WorkerBackend};
use genqueue_core::job::{Job, JobStatus};

use crate::backoff::next_delay;
use crate::events::QueueEvent;
use crate::queue::{requeue_failed, DispatchTicket, InFlightEntry, QueueManager};

/// Result of one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Jobs moved to `processing` this cycle.
    pub dispatched: usize,
    /// Jobs left pending because no backend could take them.
    pub waiting: usize,
}

/// Everything an execution task needs, captured at dispatch time.
struct Assignment {
    job: Job,
    backend_id: String,
    backend: Arc<dyn WorkerBackend>,
    dispatch_id: u64,
    cancel: CancellationToken,
}

/// How a backend run ended, as seen by the execution task.
#[derive(Debug)]
enum RunOutcome {
    Completed(serde_json::Value),
    Failed(String),
    /// The backend could not be reached. Also flips its health flag.
    Unavailable(String),
}

fn is_current(entry: &InFlightEntry, dispatch_id: u64) -> bool {
    entry.job.status == JobStatus::Processing
        && entry
            .ticket
            .as_ref()
            .is_some_and(|t| t.dispatch_id == dispatch_id)
}

impl QueueManager {
    /// Run the dispatch loop until `cancel` fires.
    ///
    /// Between cycles the loop sleeps for `poll_interval`, or for an
    /// exponentially growing delay while jobs wait on a backend. Any queue
    /// mutation that could unblock a job wakes it early.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_auto_retries = self.config.max_auto_retries,
            "Job dispatcher started",
        );

        let mut idle_delay: Option<Duration> = None;
        loop {
            let outcome = self.dispatch_ready().await;

            let delay = if outcome.waiting > 0 && outcome.dispatched == 0 {
                let d = match idle_delay {
                    None => self.config.backoff.initial_delay,
                    Some(d) => next_delay(d, &self.config.backoff),
                };
                idle_delay = Some(d);
                tracing::debug!(
                    waiting = outcome.waiting,
                    delay_ms = d.as_millis() as u64,
                    "No eligible backend, backing off",
                );
                d
            } else {
                idle_delay = None;
                self.config.poll_interval
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shutdown();
        self.close_results().await;
    }

    /// One dispatch cycle.
    ///
    /// Walks the pending collection in dispatch order and assigns every job
    /// whose generation type has a healthy backend with spare capacity. A
    /// job blocked on capability does not hold back lower-priority jobs of
    /// other types.
    pub async fn dispatch_ready(self: &Arc<Self>) -> DispatchOutcome {
        let mut assignments = Vec::new();
        let waiting = {
            let mut state = self.state.lock().await;
            let st = &mut *state;
            loop {
                let next = st.pending.iter().find_map(|(key, job)| {
                    st.load
                        .select(job.generation_type)
                        .map(|backend_id| (*key, backend_id.to_string()))
                });
                let Some((key, backend_id)) = next else {
                    break;
                };
                let Some(backend) = st.backends.get(&backend_id).cloned() else {
                    tracing::error!(backend_id = %backend_id, "Selected backend has no handle");
                    break;
                };
                let Some(mut job) = st.pending.remove(&key) else {
                    break;
                };
                st.pending_index.remove(&job.id);

                if let Err(e) = job.start(&backend_id, Utc::now()) {
                    tracing::error!(job_id = %job.id, error = %e, "Cannot start pending job");
                    st.insert_pending(key, job);
                    break;
                }
                st.load.acquire(&backend_id);
                st.next_dispatch_id += 1;
                let dispatch_id = st.next_dispatch_id;
                let cancel = self.shutdown.child_token();

                st.in_flight.insert(InFlightEntry {
                    job: job.clone(),
                    key,
                    ticket: Some(DispatchTicket {
                        dispatch_id,
                        cancel: cancel.clone(),
                    }),
                });
                assignments.push(Assignment {
                    job,
                    backend_id,
                    backend,
                    dispatch_id,
                    cancel,
                });
            }
            st.pending.len()
        };

        let dispatched = assignments.len();
        for assignment in assignments {
            tracing::info!(
                job_id = %assignment.job.id,
                backend_id = %assignment.backend_id,
                generation_type = %assignment.job.generation_type,
                "Job dispatched",
            );
            self.publish(QueueEvent::JobStarted {
                job_id: assignment.job.id.clone(),
                backend_id: assignment.backend_id.clone(),
            });
            tokio::spawn(Arc::clone(self).execute(assignment));
        }

        DispatchOutcome {
            dispatched,
            waiting,
        }
    }

    async fn execute(self: Arc<Self>, assignment: Assignment) {
        if let Some(outcome) = self.drive(&assignment).await {
            self.finish(&assignment, outcome).await;
        }
    }

    /// Submit and poll until the backend reports an outcome. Returns `None`
    /// when the dispatch was cancelled from outside.
    async fn drive(&self, a: &Assignment) -> Option<RunOutcome> {
        let handle = match a.backend.submit(&a.job).await {
            Ok(handle) => handle,
            Err(BackendError::Unavailable(msg)) => return Some(RunOutcome::Unavailable(msg)),
            Err(e) => return Some(RunOutcome::Failed(format!("Submission failed: {e}"))),
        };
        tracing::debug!(job_id = %a.job.id, handle = %handle, "Job submitted to backend");

        // Cancelled while the submit request was in flight.
        if a.cancel.is_cancelled() {
            self.cancel_backend(a, &handle).await;
            return None;
        }

        let interval = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let job_timeout = self.config.job_timeout;
        let deadline = async move {
            match job_timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut poll_errors = 0u32;
        loop {
            tokio::select! {
                _ = a.cancel.cancelled() => {
                    self.cancel_backend(a, &handle).await;
                    return None;
                }
                _ = &mut deadline => {
                    self.cancel_backend(a, &handle).await;
                    let secs = job_timeout.map(|t| t.as_secs()).unwrap_or_default();
                    return Some(RunOutcome::Failed(format!("Job timed out after {secs}s")));
                }
                _ = ticker.tick() => {
                    match a.backend.poll(&handle).await {
                        Ok(BackendPoll::Pending { progress }) => {
                            poll_errors = 0;
                            if let Some(percent) = progress {
                                self.record_progress(a, percent).await;
                            }
                        }
                        Ok(BackendPoll::Completed(result)) => {
                            return Some(RunOutcome::Completed(result));
                        }
                        Ok(BackendPoll::Failed(message)) => {
                            return Some(RunOutcome::Failed(message));
                        }
                        Err(e) => {
                            poll_errors += 1;
                            tracing::warn!(
                                job_id = %a.job.id,
                                backend_id = %a.backend_id,
                                poll_errors,
                                error = %e,
                                "Backend poll failed",
                            );
                            if poll_errors >= self.config.max_poll_errors.max(1) {
                                return Some(RunOutcome::Failed(format!(
                                    "Lost contact with backend after {poll_errors} poll errors: {e}"
                                )));
                            }
                        }
                    }
                }
            }
        }
    }

    async fn cancel_backend(&self, a: &Assignment, handle: &BackendHandle) {
        match a.backend.cancel(handle).await {
            Ok(()) => tracing::debug!(job_id = %a.job.id, handle = %handle, "Backend job cancelled"),
            Err(e) => tracing::warn!(
                job_id = %a.job.id,
                backend_id = %a.backend_id,
                error = %e,
                "Backend cancel failed",
            ),
        }
    }

    async fn record_progress(&self, a: &Assignment, percent: u8) {
        let changed = {
            let mut state = self.state.lock().await;
            match state.in_flight.get_mut(&a.job.id) {
                Some(entry) if is_current(entry, a.dispatch_id) => {
                    let before = entry.job.progress_percent;
                    entry.job.set_progress(percent);
                    entry.job.progress_percent != before
                }
                _ => false,
            }
        };
        if changed {
            self.publish(QueueEvent::JobProgress {
                job_id: a.job.id.clone(),
                percent: percent.min(100),
            });
        }
    }

    /// Apply a backend outcome. Late outcomes for a dispatch that is no
    /// longer current are dropped without touching the job or the load.
    async fn finish(&self, a: &Assignment, outcome: RunOutcome) {
        let job_id = a.job.id.as_str();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            let st = &mut *state;
            let Some(entry) = st.in_flight.get_mut(job_id) else {
                tracing::debug!(job_id, "Discarding outcome for removed job");
                return;
            };
            if !is_current(entry, a.dispatch_id) {
                tracing::debug!(job_id, status = %entry.job.status, "Discarding stale outcome");
                return;
            }
            entry.ticket = None;
            st.load.release(&a.backend_id);
            if matches!(outcome, RunOutcome::Unavailable(_))
                && st.load.set_health(&a.backend_id, false).unwrap_or(false)
            {
                tracing::warn!(backend_id = %a.backend_id, "Backend marked unhealthy after failed submit");
            }
            let now = Utc::now();

            match outcome {
                RunOutcome::Completed(result) => {
                    if let Err(e) = entry.job.complete(result, now) {
                        tracing::error!(job_id, error = %e, "Cannot complete job");
                        return;
                    }
                    let job = entry.job.clone();
                    // Recorded under the queue lock so a concurrent cancel or
                    // delete cannot leave an entry behind for a dropped job.
                    if let Err(e) = self.gallery.record_result(&job).await {
                        tracing::error!(job_id, error = %e, "Failed to record gallery entry");
                    }
                    if let Some(results) = &st.results {
                        if results.send(job.clone()).is_err() {
                            tracing::warn!(job_id, "Result receiver dropped, completed job not persisted");
                        }
                    }
                    tracing::info!(job_id, backend_id = %a.backend_id, "Job completed");
                    events.push(QueueEvent::JobCompleted { job });
                }
                RunOutcome::Failed(message) | RunOutcome::Unavailable(message) => {
                    if let Err(e) = entry.job.fail(message.clone(), now) {
                        tracing::error!(job_id, error = %e, "Cannot fail job");
                        return;
                    }
                    let retry_count = entry.job.retry_count;
                    tracing::warn!(
                        job_id,
                        backend_id = %a.backend_id,
                        retry_count,
                        error = %message,
                        "Job failed",
                    );
                    events.push(QueueEvent::JobFailed {
                        job_id: job_id.to_string(),
                        error: message,
                        retry_count,
                    });

                    if retry_count < self.config.max_auto_retries {
                        match requeue_failed(st, job_id) {
                            Ok(job) => {
                                tracing::info!(job_id, retry_count = job.retry_count, "Job auto-retried");
                                events.push(QueueEvent::JobRetried {
                                    job_id: job.id,
                                    retry_count: job.retry_count,
                                    automatic: true,
                                });
                            }
                            Err(e) => tracing::error!(job_id, error = %e, "Auto-retry failed"),
                        }
                    }
                }
            }
        }

        for event in events {
            self.publish(event);
        }
        self.wake.notify_one();
    }
}
