//! Runtime configuration for sync scheduling and logging.
//!
//! # Responsibility
//! - Define tunables read by the scheduler, engine and logging bootstrap.
//! - Parse JSON configuration with every field defaulted.
//!
//! # Invariants
//! - `max_attempts` never exceeds `MAX_SYNC_ATTEMPTS`.
//! - Validated configs always have a non-zero pull concurrency.

use crate::sync::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Upper bound on attempts for one requested sync.
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 2_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
const DEFAULT_PULL_CONCURRENCY: usize = 4;
const DEFAULT_MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid configuration document: {message}"),
            Self::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Scheduler and engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet window after the latest request before a pass starts.
    pub debounce_ms: u64,
    /// Attempts per requested sync, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Concurrent per-parent queries inside one pull step.
    pub pull_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_attempts: MAX_SYNC_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            pull_concurrency: DEFAULT_PULL_CONCURRENCY,
        }
    }
}

impl SyncConfig {
    /// Parses and validates a JSON document; missing fields use defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_SYNC_ATTEMPTS {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: format!("must be within 1..={MAX_SYNC_ATTEMPTS}, got {}", self.max_attempts),
            });
        }
        if self.pull_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "pull_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid {
                field: "initial_backoff_ms",
                reason: format!(
                    "must not exceed max_backoff_ms ({} > {})",
                    self.initial_backoff_ms, self.max_backoff_ms
                ),
            });
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: String,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: String::new(),
            max_file_bytes: DEFAULT_MAX_LOG_FILE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LogConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }
}
