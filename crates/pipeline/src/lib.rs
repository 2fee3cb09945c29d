//! Queueing, dispatch, and result bookkeeping for generation jobs.
//!
//! - [`queue::QueueManager`] owns job state and runs the dispatch loop
//!   ([`dispatcher`]).
//! - [`batch::BatchGenerator`] groups submissions.
//! - [`health::HealthMonitor`] keeps backend health flags current.
//! - [`service::GenerationService`] is the request-facing entry point.

pub mod backoff;
pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod gallery;
pub mod health;
pub mod load;
pub mod memory_store;
pub mod queue;
pub mod service;
