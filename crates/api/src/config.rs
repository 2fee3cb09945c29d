use std::str::FromStr;
use std::time::Duration;

use genqueue_core::job::GenerationType;
use genqueue_core::worker_pool::{validate_registration, BackendRegistration};
use genqueue_pipeline::config::QueueConfig;

/// Default `WORKER_BACKENDS` value: one in-process mock.
pub const DEFAULT_WORKER_BACKENDS: &str = "local-mock=mock://";

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// How a configured backend is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// In-process [`MockBackend`](genqueue_backend::mock::MockBackend).
    Mock,
    /// A worker speaking the uniform HTTP contract at this base URL.
    Http(String),
}

/// One entry of `WORKER_BACKENDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub registration: BackendRegistration,
    pub target: BackendTarget,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development: no database
/// (in-memory clip store) and a single mock backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Postgres URL. `None` selects the in-memory clip store.
    pub database_url: Option<String>,
    pub backends: Vec<BackendSpec>,
    pub queue: QueueConfig,
    pub health_check_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            database_url: None,
            backends: vec![BackendSpec {
                registration: BackendRegistration::new("local-mock"),
                target: BackendTarget::Mock,
            }],
            queue: QueueConfig::default(),
            health_check_interval: Duration::from_secs(30),
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `DATABASE_URL`              | unset (in-memory store) |
    /// | `WORKER_BACKENDS`           | `local-mock=mock://`    |
    /// | `QUEUE_POLL_INTERVAL_MS`    | `1000`                  |
    /// | `QUEUE_MAX_AUTO_RETRIES`    | `0`                     |
    /// | `QUEUE_JOB_TIMEOUT_SECS`    | unset (no timeout)      |
    /// | `QUEUE_MAX_POLL_ERRORS`     | `3`                     |
    /// | `HEALTH_CHECK_INTERVAL_SECS`| `30`                    |
    /// | `LOG_FORMAT`                | `text` (`json`)         |
    ///
    /// `WORKER_BACKENDS` is a `;`-separated list of
    /// `id=url[|types[|max_concurrent]]`, where `types` is a comma-separated
    /// list of generation types (empty means all) and `url` is either
    /// `http(s)://...` or `mock://`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or(defaults.host);
        let port = parse_or("PORT", var("PORT"), defaults.port)?;

        let cors_origins = match var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        let request_timeout_secs = parse_or(
            "REQUEST_TIMEOUT_SECS",
            var("REQUEST_TIMEOUT_SECS"),
            defaults.request_timeout_secs,
        )?;

        let backends = parse_backends(
            var("WORKER_BACKENDS")
                .as_deref()
                .unwrap_or(DEFAULT_WORKER_BACKENDS),
        )?;

        let poll_ms: u64 = parse_or("QUEUE_POLL_INTERVAL_MS", var("QUEUE_POLL_INTERVAL_MS"), 1000)?;
        if poll_ms == 0 {
            return Err(invalid("QUEUE_POLL_INTERVAL_MS", "0", "must be positive"));
        }
        let health_secs: u64 = parse_or(
            "HEALTH_CHECK_INTERVAL_SECS",
            var("HEALTH_CHECK_INTERVAL_SECS"),
            defaults.health_check_interval.as_secs(),
        )?;
        if health_secs == 0 {
            return Err(invalid("HEALTH_CHECK_INTERVAL_SECS", "0", "must be positive"));
        }

        let job_timeout_secs = var("QUEUE_JOB_TIMEOUT_SECS")
            .map(|raw| parse::<u64>("QUEUE_JOB_TIMEOUT_SECS", &raw))
            .transpose()?;
        if job_timeout_secs == Some(0) {
            return Err(invalid("QUEUE_JOB_TIMEOUT_SECS", "0", "must be positive"));
        }

        let queue = QueueConfig {
            poll_interval: Duration::from_millis(poll_ms),
            max_auto_retries: parse_or("QUEUE_MAX_AUTO_RETRIES", var("QUEUE_MAX_AUTO_RETRIES"), 0)?,
            max_poll_errors: parse_or(
                "QUEUE_MAX_POLL_ERRORS",
                var("QUEUE_MAX_POLL_ERRORS"),
                defaults.queue.max_poll_errors,
            )?,
            job_timeout: job_timeout_secs.map(Duration::from_secs),
            ..defaults.queue
        };

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(f) if f == "text" => LogFormat::Text,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", &other, "expected 'text' or 'json'")),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url: var("DATABASE_URL"),
            backends,
            queue,
            health_check_interval: Duration::from_secs(health_secs),
            log_format,
        })
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(var, raw, e.to_string()))
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |raw| parse(var, &raw))
}

/// Parse a `WORKER_BACKENDS` value.
pub fn parse_backends(raw: &str) -> Result<Vec<BackendSpec>, ConfigError> {
    const VAR: &str = "WORKER_BACKENDS";

    let mut specs: Vec<BackendSpec> = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, rest) = entry
            .split_once('=')
            .ok_or_else(|| invalid(VAR, entry, "expected id=url"))?;
        let mut parts = rest.split('|');
        let url = parts.next().unwrap_or_default().trim();

        let target = if url.starts_with("mock://") {
            BackendTarget::Mock
        } else if url.starts_with("http://") || url.starts_with("https://") {
            BackendTarget::Http(url.to_string())
        } else {
            return Err(invalid(VAR, entry, "url must start with http://, https://, or mock://"));
        };

        let capabilities = match parts.next().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(types) => types
                .split(',')
                .map(|t| GenerationType::from_str(t.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(VAR, entry, e.to_string()))?,
        };

        let mut registration =
            BackendRegistration::new(id.trim()).with_capabilities(capabilities);
        if let Some(max) = parts.next().map(str::trim).filter(|m| !m.is_empty()) {
            let max: u32 = parse(VAR, max)?;
            registration = registration.with_max_concurrent_jobs(max);
        }
        if parts.next().is_some() {
            return Err(invalid(VAR, entry, "too many '|' separated fields"));
        }
        validate_registration(&registration).map_err(|e| invalid(VAR, entry, e.to_string()))?;
        if specs.iter().any(|s| s.registration.id == registration.id) {
            return Err(invalid(VAR, entry, "duplicate backend id"));
        }

        specs.push(BackendSpec {
            registration,
            target,
        });
    }

    if specs.is_empty() {
        return Err(invalid(VAR, raw, "at least one backend is required"));
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].target, BackendTarget::Mock);
        assert_eq!(config.queue.poll_interval, Duration::from_secs(1));
        assert_eq!(config.queue.job_timeout, None);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn queue_settings_from_env() {
        let config = from_map(&[
            ("QUEUE_POLL_INTERVAL_MS", "250"),
            ("QUEUE_MAX_AUTO_RETRIES", "2"),
            ("QUEUE_JOB_TIMEOUT_SECS", "600"),
            ("LOG_FORMAT", "JSON"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ])
        .unwrap();
        assert_eq!(config.queue.poll_interval, Duration::from_millis(250));
        assert_eq!(config.queue.max_auto_retries, 2);
        assert_eq!(config.queue.job_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        assert_matches!(
            from_map(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        );
        assert_matches!(
            from_map(&[("QUEUE_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid { var: "QUEUE_POLL_INTERVAL_MS", .. })
        );
        assert_matches!(
            from_map(&[("QUEUE_JOB_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { var: "QUEUE_JOB_TIMEOUT_SECS", .. })
        );
    }

    #[test]
    fn parses_backend_list() {
        let specs = parse_backends(
            "gpu-1=http://gpu-1:9000|image,video|2; faces=https://faces.internal|face_op ;dev=mock://",
        )
        .unwrap();

        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].target, BackendTarget::Http("http://gpu-1:9000".to_string()));
        assert_eq!(
            specs[0].registration.capabilities,
            vec![GenerationType::Image, GenerationType::Video]
        );
        assert_eq!(specs[0].registration.max_concurrent_jobs, Some(2));
        assert_eq!(specs[1].registration.capabilities, vec![GenerationType::FaceOp]);
        assert_eq!(specs[1].registration.max_concurrent_jobs, None);
        assert_eq!(specs[2].target, BackendTarget::Mock);
        assert!(specs[2].registration.capabilities.is_empty());
    }

    #[test]
    fn rejects_bad_backend_entries() {
        assert!(parse_backends("").is_err());
        assert!(parse_backends("no-url").is_err());
        assert!(parse_backends("a=ftp://host").is_err());
        assert!(parse_backends("a=mock://|sculpture").is_err());
        assert!(parse_backends("a=mock://||0").is_err());
        assert!(parse_backends("a=mock://;a=mock://").is_err());
        assert!(parse_backends("bad id=mock://").is_err());
    }
}
