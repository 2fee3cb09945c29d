//! In-flight job accounting and backend selection.
//!
//! Lives inside the queue state so that a dispatch (pending -> in-flight
//! move plus load increment) happens under a single lock.

use serde::Serialize;

use genqueue_core::error::CoreError;
use genqueue_core::job::GenerationType;
use genqueue_core::worker_pool::{validate_registration, BackendRegistration};

/// Snapshot of one backend's load and health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendLoad {
    pub backend_id: String,
    pub healthy: bool,
    pub current_jobs: u32,
    pub max_concurrent_jobs: Option<u32>,
    pub capabilities: Vec<GenerationType>,
}

#[derive(Debug)]
struct BackendSlot {
    registration: BackendRegistration,
    healthy: bool,
    current_jobs: u32,
}

impl BackendSlot {
    fn eligible_for(&self, generation_type: GenerationType) -> bool {
        self.healthy
            && self.registration.supports(generation_type)
            && self.registration.has_capacity(self.current_jobs)
    }
}

/// Per-backend in-flight counts in registration order.
#[derive(Debug, Default)]
pub struct LoadTracker {
    slots: Vec<BackendSlot>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. New backends start healthy with zero load; the health
    /// monitor corrects the flag on its first probe.
    pub fn register(&mut self, registration: BackendRegistration) -> Result<(), CoreError> {
        validate_registration(&registration)?;
        if self.slot(&registration.id).is_some() {
            return Err(CoreError::Conflict(format!(
                "Backend '{}' is already registered",
                registration.id
            )));
        }
        self.slots.push(BackendSlot {
            registration,
            healthy: true,
            current_jobs: 0,
        });
        Ok(())
    }

    /// Update a backend's health flag. Returns `true` if the flag changed.
    pub fn set_health(&mut self, backend_id: &str, healthy: bool) -> Result<bool, CoreError> {
        let slot = self.slot_mut(backend_id).ok_or_else(|| CoreError::NotFound {
            entity: "Backend",
            id: backend_id.to_string(),
        })?;
        let changed = slot.healthy != healthy;
        slot.healthy = healthy;
        Ok(changed)
    }

    /// Pick the backend for the next job of `generation_type`.
    ///
    /// Among healthy backends that serve the type and have spare capacity,
    /// the lowest load wins. Ties go to the earliest registration.
    pub fn select(&self, generation_type: GenerationType) -> Option<&str> {
        let mut best: Option<&BackendSlot> = None;
        for slot in self.slots.iter().filter(|s| s.eligible_for(generation_type)) {
            // Strict `<` keeps the earlier registration on ties.
            let better = match best {
                None => true,
                Some(b) => slot.current_jobs < b.current_jobs,
            };
            if better {
                best = Some(slot);
            }
        }
        best.map(|s| s.registration.id.as_str())
    }

    pub fn acquire(&mut self, backend_id: &str) {
        if let Some(slot) = self.slot_mut(backend_id) {
            slot.current_jobs += 1;
        }
    }

    /// Release one slot. Saturates at zero.
    pub fn release(&mut self, backend_id: &str) {
        if let Some(slot) = self.slot_mut(backend_id) {
            slot.current_jobs = slot.current_jobs.saturating_sub(1);
        }
    }

    pub fn snapshot(&self) -> Vec<BackendLoad> {
        self.slots
            .iter()
            .map(|s| BackendLoad {
                backend_id: s.registration.id.clone(),
                healthy: s.healthy,
                current_jobs: s.current_jobs,
                max_concurrent_jobs: s.registration.max_concurrent_jobs,
                capabilities: s.registration.capabilities.clone(),
            })
            .collect()
    }

    fn slot(&self, backend_id: &str) -> Option<&BackendSlot> {
        self.slots.iter().find(|s| s.registration.id == backend_id)
    }

    fn slot_mut(&mut self, backend_id: &str) -> Option<&mut BackendSlot> {
        self.slots.iter_mut().find(|s| s.registration.id == backend_id)
    }
}
