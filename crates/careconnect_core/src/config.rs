//! Runtime configuration for hosts embedding the guardianship core.
//!
//! # Responsibility
//! - Describe database, logging and write-retry settings in one place.
//! - Load settings from JSON with defaults for every omitted field.
//!
//! # Invariants
//! - A loaded config has passed `validate()`.
//! - `max_write_attempts >= 1`; a value of 1 disables retries.
//! - Defaults for storage and retry settings come from `DbOptions::default()`
//!   and `RetryPolicy::default()`.

use crate::db::DbOptions;
use crate::logging::{default_log_level, parse_level};
use crate::service::relationship_manager::RetryPolicy;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOG_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_LOG_MAX_FILES: usize = 5;

/// Core settings; every field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Database file. `None` means the host decides (the CLI requires one).
    pub db_path: Option<PathBuf>,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// Rotate the active log file once it reaches this size.
    pub log_max_file_bytes: u64,
    /// Rotated log files kept on disk.
    pub log_max_files: usize,
    pub busy_timeout_ms: u64,
    /// Total attempts for one relationship write when the store is busy.
    pub max_write_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let db = DbOptions::default();
        let retry = RetryPolicy::default();
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            log_max_file_bytes: DEFAULT_LOG_MAX_FILE_BYTES,
            log_max_files: DEFAULT_LOG_MAX_FILES,
            busy_timeout_ms: duration_ms(db.busy_timeout),
            max_write_attempts: retry.max_attempts,
            retry_backoff_ms: duration_ms(retry.backoff),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unsupported log_level `{}`; expected trace|debug|info|warn|error",
                self.log_level
            )));
        }
        if self.log_max_file_bytes == 0 || self.log_max_files == 0 {
            return Err(ConfigError::Invalid(
                "log_max_file_bytes and log_max_files must be at least 1".to_string(),
            ));
        }
        if self.max_write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_write_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(log_dir) = self.log_dir.as_deref() {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_write_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
