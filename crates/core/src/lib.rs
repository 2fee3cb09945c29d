//! Domain types for the generation queue.
//!
//! Zero internal dependencies: jobs and their state machine, batches,
//! scheduling order, backend registration, and the collaborator traits
//! (`WorkerBackend`, `ClipStore`) the pipeline is written against.

pub mod backend;
pub mod batch;
pub mod clip;
pub mod error;
pub mod job;
pub mod scheduling;
pub mod types;
pub mod worker_pool;
