//! # Constants
//!
//! Shared constants used throughout the handlers.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::HandlerConfig`]).

/// Physical resource id reported when a Create never completed.
///
/// A later Delete carrying this id is acknowledged without touching any
/// backing service.
pub const CREATE_FAILED_MARKER: &str = "CREATE_FAILED";

/// Default interval between CodeBuild status polls (seconds)
pub const DEFAULT_BUILD_POLL_INTERVAL_SECS: u64 = 10;

/// Default time the layer handler watches a build before handing off (seconds)
/// Kept below the 15 minute Lambda ceiling so the handler can still report
pub const DEFAULT_BUILD_WAIT_TIMEOUT_SECS: u64 = 840;

/// Default HTTP timeout for the callback PUT (seconds)
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 30;

/// RSA modulus length used for CloudFront public keys
/// CloudFront only accepts 2048 bit RSA keys
pub const CLOUDFRONT_RSA_MODULUS_LENGTH: usize = 2048;

/// Smallest modulus length accepted for generated key pairs
pub const MIN_RSA_MODULUS_LENGTH: u32 = 1024;

/// Largest modulus length accepted for generated key pairs
pub const MAX_RSA_MODULUS_LENGTH: u32 = 16384;

/// Characters excluded from generated Cognito passwords
pub const PASSWORD_EXCLUDED_CHARACTERS: &str = "+-=";

/// CloudFormation rejects response bodies above 4096 bytes; reasons are capped
/// well below that so ids and data still fit
pub const MAX_REASON_LENGTH: usize = 2048;
