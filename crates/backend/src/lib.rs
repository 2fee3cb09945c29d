//! [`WorkerBackend`](genqueue_core::backend::WorkerBackend) adapters.
//!
//! - [`http::HttpWorkerBackend`] speaks the uniform worker HTTP contract
//!   through the [`api::WorkerApi`] client.
//! - [`mock::MockBackend`] runs in-process for local development and tests.

pub mod api;
pub mod http;
pub mod mock;
