//! # AWS Providers
//!
//! AWS SDK implementations of the capability traits in [`crate::provider`].
//!
//! All clients are built from one [`SdkConfig`] loaded through the default
//! credential chain. Inside Lambda that is the function's execution role.

use aws_config::SdkConfig;
use tracing::info;

pub mod cloudfront;
pub mod codebuild;
pub mod cognito;
pub mod lambda;
pub mod parameter_store;
pub mod secrets_manager;

pub use cloudfront::CloudFrontPublicKeys;
pub use codebuild::CodeBuildService;
pub use cognito::CognitoUserPool;
pub use lambda::LambdaLayers;
pub use parameter_store::SsmParameterStore;
pub use secrets_manager::SecretsManagerSource;

/// Load AWS SDK config using the default credential chain
///
/// `region` overrides the region resolved from the environment.
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = region {
        info!("Using AWS region override: {}", region);
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }

    loader.load().await
}

/// Render an SDK error with its full source chain
///
/// `SdkError`'s own `Display` only says "service error"; the service message
/// lives in the source chain.
pub(crate) fn service_error<E>(context: &str, err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    anyhow::Error::new(err).context(context.to_string())
}
