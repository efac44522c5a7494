//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub log_level: Level,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub token_store_path: PathBuf,
    pub notice_dismiss_after: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- API Settings ---
        let api_base_url = lookup("API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("API_BASE_URL".to_string()))?;
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Timing Settings ---
        let poll_interval = Duration::from_millis(parse_u64(&lookup, "POLL_INTERVAL_MS", 4000)?);
        let request_timeout = Duration::from_secs(parse_u64(&lookup, "REQUEST_TIMEOUT_SECS", 30)?);
        let notice_dismiss_after =
            Duration::from_millis(parse_u64(&lookup, "NOTICE_DISMISS_MS", 5000)?);

        // --- Credential Storage ---
        let token_store_path = lookup("TOKEN_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.docqa/credentials.json"));

        Ok(Self {
            api_base_url,
            log_level,
            poll_interval,
            request_timeout,
            token_store_path,
            notice_dismiss_after,
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
