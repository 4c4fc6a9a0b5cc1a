//! # Provider Modules
//!
//! Capability interfaces for the backing services the reconcilers talk to.
//!
//! Each reconciler receives the capabilities it needs as `Arc<dyn Trait>`,
//! so tests can substitute in-memory fakes for the AWS clients in [`aws`].
//!
//! Every backing service reports "resource absent" through
//! [`ProviderError::NotFound`]; implementations are responsible for mapping
//! their own service-specific signal onto it.

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

pub mod aws;

/// Errors raised by a backing service
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The service reported that the named resource does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    /// Any other service or transport failure
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Treat a not-found failure of a delete as an already-completed delete
pub trait IgnoreNotFound {
    /// Returns `Ok(true)` when something was deleted and `Ok(false)` when the
    /// resource was already absent
    fn ignore_not_found(self) -> ProviderResult<bool>;
}

impl IgnoreNotFound for ProviderResult<()> {
    fn ignore_not_found(self) -> ProviderResult<bool> {
        match self {
            Ok(()) => Ok(true),
            Err(ProviderError::NotFound { kind, name }) => {
                tracing::warn!("{} {} does not exist", kind, name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Storage class of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Plain text
    String,
    /// Encrypted with the account's default KMS key
    SecureString,
}

/// Parameter store (SSM Parameter Store)
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write a parameter. With `overwrite` unset, writing an existing name fails.
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        kind: ParameterKind,
        overwrite: bool,
    ) -> ProviderResult<()>;

    /// Read a parameter, decrypting secure strings
    async fn get_parameter(&self, name: &str) -> ProviderResult<Zeroizing<String>>;

    async fn delete_parameter(&self, name: &str) -> ProviderResult<()>;
}

/// Registration data of a CDN public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyConfig {
    /// Idempotency token; a second create with the same reference is rejected
    pub caller_reference: String,
    pub name: String,
    /// SPKI PEM
    pub encoded_key: String,
    pub comment: Option<String>,
}

/// A registered public key together with its optimistic-concurrency tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEntry {
    pub id: String,
    pub config: PublicKeyConfig,
    pub etag: String,
}

/// CDN public key registry (CloudFront)
#[async_trait]
pub trait PublicKeyRegistry: Send + Sync {
    /// Register a key and return the registry-assigned id
    async fn create_public_key(&self, config: &PublicKeyConfig) -> ProviderResult<String>;

    async fn get_public_key(&self, id: &str) -> ProviderResult<PublicKeyEntry>;

    /// Replace the mutable parts of a key's config; `etag` must be current
    async fn update_public_key(
        &self,
        id: &str,
        etag: &str,
        config: &PublicKeyConfig,
    ) -> ProviderResult<()>;

    /// Delete a key; `etag` must be current
    async fn delete_public_key(&self, id: &str, etag: &str) -> ProviderResult<()>;

    /// Look up the id of the key registered under `name`
    async fn find_public_key_by_name(&self, name: &str) -> ProviderResult<Option<String>>;
}

/// Identity pool admin API (Cognito user pools)
#[async_trait]
pub trait UserPoolAdmin: Send + Sync {
    async fn create_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()>;

    async fn set_permanent_password(
        &self,
        user_pool_id: &str,
        username: &str,
        password: &str,
    ) -> ProviderResult<()>;

    async fn delete_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()>;
}

/// Secret retrieval and random password generation (Secrets Manager)
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_secret_string(&self, secret_id: &str) -> ProviderResult<Zeroizing<String>>;

    async fn generate_password(
        &self,
        length: Option<u32>,
        exclude_characters: &str,
    ) -> ProviderResult<Zeroizing<String>>;
}

/// A build to start on the build service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub project_name: String,
    pub buildspec: String,
    /// Plain-text environment variable overrides, in order
    pub environment: Vec<(String, String)>,
}

/// Status of a remote build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    InProgress,
    Succeeded,
    Failed,
    Fault,
    Stopped,
    TimedOut,
    Unknown(String),
}

impl BuildStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Snapshot of a remote build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildState {
    pub status: BuildStatus,
    /// Whether the build got as far as running its BUILD phase commands
    pub reached_build_phase: bool,
}

/// Build trigger and status service (CodeBuild)
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Start a build and return its id
    async fn start_build(&self, request: &BuildRequest) -> ProviderResult<String>;

    async fn build_state(&self, build_id: &str) -> ProviderResult<BuildState>;

    /// Stop a running build
    async fn stop_build(&self, build_id: &str) -> ProviderResult<()>;
}

/// Layer publish/delete service (Lambda)
#[async_trait]
pub trait LayerRegistry: Send + Sync {
    async fn delete_layer_version(&self, layer_name: &str, version_number: i64)
        -> ProviderResult<()>;
}
