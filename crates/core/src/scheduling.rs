//! Priority constants and dispatch ordering.
//!
//! Pending jobs are ordered by `(priority desc, created_at asc, sequence asc)`.
//! `sequence` is a per-queue submission counter that breaks ties between
//! jobs created within the same clock tick, so equal inputs always produce
//! the same dispatch order.

use std::cmp::Ordering;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority value for urgent jobs. Dispatched before all others.
pub const PRIORITY_URGENT: i32 = 10;

/// Priority value for normal jobs. Default.
pub const PRIORITY_NORMAL: i32 = 0;

/// Priority value for background jobs. Dispatched last.
pub const PRIORITY_BACKGROUND: i32 = -10;

/// Reject priorities outside `PRIORITY_BACKGROUND..=PRIORITY_URGENT`.
pub fn validate_priority(priority: i32) -> Result<(), CoreError> {
    if (PRIORITY_BACKGROUND..=PRIORITY_URGENT).contains(&priority) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Priority must be between {PRIORITY_BACKGROUND} and {PRIORITY_URGENT}, got {priority}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Dispatch ordering
// ---------------------------------------------------------------------------

/// Sort key for the pending collection. Smallest key is dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchKey {
    pub priority: i32,
    pub created_at: Timestamp,
    pub sequence: u64,
}

impl Ord for DispatchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for DispatchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
