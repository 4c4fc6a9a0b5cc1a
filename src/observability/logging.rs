//! # Logging
//!
//! tracing-subscriber setup for the Lambda bootstraps and the CLI.
//!
//! `RUST_LOG` wins when set; otherwise `LOG_LEVEL` applies to this crate
//! and `warn` to everything else (the AWS SDK is chatty at `info`).
//! Timestamps are left to the Lambda log sink.

use crate::config::HandlerConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Build the env filter for a configured level
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,custom_resource_handlers={}",
            log_level.to_ascii_lowercase()
        ))
    })
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &HandlerConfig) -> Result<()> {
    let filter = env_filter(&config.log_level);

    let result = if config.log_format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .without_time()
            .with_target(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .without_time()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialize tracing: {e}"))
}
