//! Worker backend registration and validation.
//!
//! Pure types shared by the pipeline (load tracking) and the API (backend
//! configuration parsing).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::GenerationType;

/// Maximum length of a backend id.
const MAX_ID_LEN: usize = 128;

/// Static description of a backend joining the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRegistration {
    pub id: String,
    /// Generation types this backend serves. Empty means all types.
    #[serde(default)]
    pub capabilities: Vec<GenerationType>,
    /// Upper bound on concurrent jobs. `None` means unbounded.
    #[serde(default)]
    pub max_concurrent_jobs: Option<u32>,
}

impl BackendRegistration {
    /// A backend that serves every type with no concurrency cap.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            max_concurrent_jobs: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<GenerationType>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: u32) -> Self {
        self.max_concurrent_jobs = Some(max);
        self
    }

    pub fn supports(&self, generation_type: GenerationType) -> bool {
        self.capabilities.is_empty() || self.capabilities.contains(&generation_type)
    }

    /// Whether another job fits under the concurrency cap.
    pub fn has_capacity(&self, current_jobs: u32) -> bool {
        self.max_concurrent_jobs.map_or(true, |max| current_jobs < max)
    }
}

/// Validate a backend id.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_ID_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_backend_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::Validation(
            "Backend id must not be empty".to_string(),
        ));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Backend id must not exceed {MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(format!(
            "Backend id '{id}' may only contain alphanumeric, hyphen, underscore, or dot characters"
        )));
    }
    Ok(())
}

/// Validate a full registration: id rules plus a non-zero capacity.
pub fn validate_registration(registration: &BackendRegistration) -> Result<(), CoreError> {
    validate_backend_id(&registration.id)?;
    if registration.max_concurrent_jobs == Some(0) {
        return Err(CoreError::Validation(format!(
            "Backend '{}' must allow at least one concurrent job",
            registration.id
        )));
    }
    Ok(())
}
