/// Clip and project keys are PostgreSQL BIGSERIAL in the surrounding application.
pub type DbId = i64;

/// Job identifiers are caller-supplied strings (uuid v4 when generated).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
