pub mod clip_repo;

pub use clip_repo::ClipRepo;
