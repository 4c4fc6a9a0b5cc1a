//! # Observability
//!
//! - `logging`: tracing subscriber initialisation (json or text)

pub mod logging;

pub use logging::init_tracing;
