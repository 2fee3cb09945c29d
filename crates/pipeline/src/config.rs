use std::time::Duration;

use crate::backoff::BackoffConfig;

/// Default interval between backend polls for an in-flight job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of consecutive poll errors tolerated before failing a job.
pub const DEFAULT_MAX_POLL_ERRORS: u32 = 3;

/// Broadcast channel capacity for queue events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Tuning knobs for [`QueueManager`](crate::queue::QueueManager).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How often execution tasks poll their backend, and how often an idle
    /// dispatch loop re-checks the queue.
    pub poll_interval: Duration,
    /// Backoff applied while jobs are pending but no backend is eligible.
    pub backoff: BackoffConfig,
    /// Automatic retries after a backend failure. `0` means manual retry only.
    pub max_auto_retries: u32,
    /// Consecutive poll errors tolerated before a job is failed.
    pub max_poll_errors: u32,
    /// Fail (and cancel) jobs that run longer than this.
    pub job_timeout: Option<Duration>,
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffConfig::default(),
            max_auto_retries: 0,
            max_poll_errors: DEFAULT_MAX_POLL_ERRORS,
            job_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
