//! Exponential backoff used by the dispatch loop when pending jobs exist
//! but no backend can take them.

use std::time::Duration;

/// Delay growth while the dispatch loop has nothing it can hand out.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first re-check.
    pub initial_delay: Duration,
    /// Upper bound on the delay between re-checks.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each idle re-check.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Delay after `current`, capped at [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    current.mul_f64(config.multiplier).min(config.max_delay)
}
