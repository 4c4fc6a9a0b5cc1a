//! # Configuration
//!
//! Environment-driven configuration for the handler binaries and the CLI.

mod handler;

pub use handler::HandlerConfig;
