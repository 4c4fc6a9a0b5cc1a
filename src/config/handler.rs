//! # Handler Configuration
//!
//! Handler-level settings loaded from environment variables.

use std::time::Duration;

/// Handler-level configuration
///
/// All settings have sensible defaults and can be overridden via environment
/// variables set on the Lambda function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// Ignored when `RUST_LOG` is set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Region override; the SDK default chain is used when unset
    pub aws_region: Option<String>,
    /// HTTP timeout for the callback PUT (seconds)
    pub callback_timeout_secs: u64,
    /// CodeBuild project that runs layer builds
    pub builder_name: Option<String>,
    /// Interval between build status polls (seconds)
    pub build_poll_interval_secs: u64,
    /// How long a build is watched before the callback is left to it (seconds)
    pub build_wait_timeout_secs: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            aws_region: None,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            builder_name: None,
            build_poll_interval_secs: DEFAULT_BUILD_POLL_INTERVAL_SECS,
            build_wait_timeout_secs: DEFAULT_BUILD_WAIT_TIMEOUT_SECS,
        }
    }
}

impl HandlerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            aws_region: env_var_non_empty("AWS_REGION"),
            callback_timeout_secs: env_var_or_default(
                "CALLBACK_TIMEOUT_SECS",
                DEFAULT_CALLBACK_TIMEOUT_SECS,
            ),
            builder_name: env_var_non_empty("BUILDER_NAME"),
            build_poll_interval_secs: env_var_or_default(
                "BUILD_POLL_INTERVAL_SECS",
                DEFAULT_BUILD_POLL_INTERVAL_SECS,
            ),
            build_wait_timeout_secs: env_var_or_default(
                "BUILD_WAIT_TIMEOUT_SECS",
                DEFAULT_BUILD_WAIT_TIMEOUT_SECS,
            ),
        }
    }

    /// Get callback timeout duration
    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Get build poll interval duration
    #[must_use]
    pub fn build_poll_interval(&self) -> Duration {
        Duration::from_secs(self.build_poll_interval_secs)
    }

    /// Get build wait timeout duration
    #[must_use]
    pub fn build_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.build_wait_timeout_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable, treating an empty value as unset
fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
