//! Configuration for callguard.
//!
//! Settings are loaded from a TOML file with environment variable overrides.
//! Every field has a default, so an empty file is a valid configuration.

use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::logging::LogLevel;
use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, MUTATION_MAX_RETRIES, QUERY_MAX_RETRIES};

/// Retry and backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries granted to query call sites
    #[serde(default = "default_query_max_retries")]
    pub query_max_retries: u32,
    /// Retries granted to mutation call sites
    #[serde(default = "default_mutation_max_retries")]
    pub mutation_max_retries: u32,
    /// Kinds that are never retried
    #[serde(default = "default_non_retryable")]
    pub non_retryable: Vec<ErrorKind>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            query_max_retries: default_query_max_retries(),
            mutation_max_retries: default_mutation_max_retries(),
            non_retryable: default_non_retryable(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}

fn default_query_max_retries() -> u32 {
    QUERY_MAX_RETRIES
}

fn default_mutation_max_retries() -> u32 {
    MUTATION_MAX_RETRIES
}

fn default_non_retryable() -> Vec<ErrorKind> {
    ErrorKind::ALL
        .into_iter()
        .filter(|kind| kind.is_caller_fixable())
        .collect()
}

/// Call wrapper settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallSettings {
    /// Keep the last successful data while reloading and after a failure
    #[serde(default)]
    pub keep_previous_data: bool,
}

/// Recovery boundary settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoundarySettings {
    /// Show raw messages and details in fallback panels
    #[serde(default)]
    pub dev_mode: bool,
    /// Color fallback panels when rendered to a terminal
    #[serde(default)]
    pub color: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Log level used when RUST_LOG is not set
    #[serde(default)]
    pub level: LogLevel,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration text is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    InvalidToml(#[from] toml::de::Error),

    /// The configuration file path is invalid.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallguardConfig {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub call: CallSettings,
    #[serde(default)]
    pub boundary: BoundarySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CallguardConfig {
    /// Load configuration from a file path.
    ///
    /// Environment variables override file values using the format
    /// `CALLGUARD__<SECTION>__<KEY>` (e.g. `CALLGUARD__RETRY__BASE_DELAY_MS=500`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, the path is not valid
    /// UTF-8, or the contents cannot be parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                Environment::with_prefix("CALLGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: CallguardConfig = config.try_deserialize()?;
        tracing::debug!(path = path_str, "loaded configuration");
        Ok(loaded)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
