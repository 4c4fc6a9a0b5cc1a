//! # Runtime
//!
//! Wires a reconciler to its AWS clients and runs it on the Lambda runtime.
//!
//! Each Lambda bootstrap binary is a one-line call into [`run_lambda`];
//! `crhctl` reuses [`build_handler`] to run the same reconcilers locally.

use crate::cfn::{HttpResponseReporter, ResponseReporter};
use crate::config::HandlerConfig;
use crate::dispatcher::{CustomResourceHandler, Dispatcher};
use crate::observability::init_tracing;
use crate::provider::aws::{
    load_sdk_config, CloudFrontPublicKeys, CodeBuildService, CognitoUserPool, LambdaLayers,
    SecretsManagerSource, SsmParameterStore,
};
use crate::reconciler::nodejs_layer::LayerBuildSettings;
use crate::reconciler::{
    cloudfront_keypair, cognito_user, keypair, nodejs_layer, CloudFrontKeyPairHandler,
    CognitoUserHandler, KeyPairHandler, NodejsLayerHandler,
};
use anyhow::{Context, Result};
use aws_config::SdkConfig;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// The custom resource types served by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResourceKind {
    /// `Custom::KeyPair`
    Keypair,
    /// `Custom::CloudFrontKeyPair`
    CloudfrontKeypair,
    /// `Custom::CognitoUserPoolUser`
    CognitoUser,
    /// `Custom::NodejsLayerVersion`
    NodejsLayer,
}

impl ResourceKind {
    #[must_use]
    pub fn resource_type(self) -> &'static str {
        match self {
            Self::Keypair => keypair::RESOURCE_TYPE,
            Self::CloudfrontKeypair => cloudfront_keypair::RESOURCE_TYPE,
            Self::CognitoUser => cognito_user::RESOURCE_TYPE,
            Self::NodejsLayer => nodejs_layer::RESOURCE_TYPE,
        }
    }

    /// Look a kind up by its CloudFormation resource type
    #[must_use]
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        [
            Self::Keypair,
            Self::CloudfrontKeypair,
            Self::CognitoUser,
            Self::NodejsLayer,
        ]
        .into_iter()
        .find(|kind| kind.resource_type() == resource_type)
    }
}

/// Build the reconciler for `kind` on top of real AWS clients
#[must_use]
pub fn build_handler(
    kind: ResourceKind,
    config: &HandlerConfig,
    sdk_config: &SdkConfig,
) -> Arc<dyn CustomResourceHandler> {
    match kind {
        ResourceKind::Keypair => {
            Arc::new(KeyPairHandler::new(Arc::new(SsmParameterStore::new(sdk_config))))
        }
        ResourceKind::CloudfrontKeypair => Arc::new(CloudFrontKeyPairHandler::new(
            Arc::new(SsmParameterStore::new(sdk_config)),
            Arc::new(CloudFrontPublicKeys::new(sdk_config)),
        )),
        ResourceKind::CognitoUser => Arc::new(CognitoUserHandler::new(
            Arc::new(CognitoUserPool::new(sdk_config)),
            Arc::new(SecretsManagerSource::new(sdk_config)),
            Arc::new(SsmParameterStore::new(sdk_config)),
        )),
        ResourceKind::NodejsLayer => Arc::new(NodejsLayerHandler::new(
            Arc::new(CodeBuildService::new(sdk_config)),
            Arc::new(LambdaLayers::new(sdk_config)),
            LayerBuildSettings::from_config(config),
        )),
    }
}

/// Build a dispatcher with the HTTP reporter
///
/// # Errors
///
/// Fails when the HTTP client cannot be created.
pub async fn build_dispatcher(kind: ResourceKind, config: &HandlerConfig) -> Result<Dispatcher> {
    let sdk_config = load_sdk_config(config.aws_region.as_deref()).await;
    let handler = build_handler(kind, config, &sdk_config);
    let reporter: Arc<dyn ResponseReporter> = Arc::new(
        HttpResponseReporter::new(config.callback_timeout())
            .context("Failed to create the callback HTTP client")?,
    );
    Ok(Dispatcher::new(handler, reporter))
}

/// Entry point of a Lambda bootstrap binary
///
/// # Errors
///
/// Fails when start-up fails or the runtime loop exits with an error.
pub async fn run_lambda(kind: ResourceKind) -> Result<(), lambda_runtime::Error> {
    let config = HandlerConfig::from_env();
    init_tracing(&config)?;

    info!(
        "Starting {} handler (build {} at {})",
        kind.resource_type(),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );

    let dispatcher = build_dispatcher(kind, &config).await?;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = dispatcher.clone();
        async move {
            let result = dispatcher.dispatch(event.payload).await?;
            Ok::<Value, lambda_runtime::Error>(serde_json::to_value(result)?)
        }
    }))
    .await
}
