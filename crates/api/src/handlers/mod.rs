pub mod batches;
pub mod gallery;
pub mod jobs;
