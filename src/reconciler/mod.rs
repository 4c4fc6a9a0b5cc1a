//! # Reconcilers
//!
//! One [`CustomResourceHandler`](crate::dispatcher::CustomResourceHandler)
//! per custom resource type. Each one is a function of the lifecycle event
//! and the capabilities it was built with; none keeps state between
//! invocations.
//!
//! - `keypair`: RSA key pair stored in two SSM parameters
//! - `cloudfront_keypair`: RSA key pair with the public half registered in CloudFront
//! - `cognito_user`: Cognito user pool user with a permanent password
//! - `nodejs_layer`: Lambda layer built from an npm package by CodeBuild

pub mod cloudfront_keypair;
pub mod cognito_user;
pub mod keypair;
pub mod nodejs_layer;

pub use cloudfront_keypair::CloudFrontKeyPairHandler;
pub use cognito_user::CognitoUserHandler;
pub use keypair::KeyPairHandler;
pub use nodejs_layer::NodejsLayerHandler;

use crate::crypto::{self, GeneratedKeyPair, KeyType};
use crate::error::{HandlerError, HandlerResult};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// `{ "SsmParameter": "/path" }` block of the key pair properties
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SsmParameterRef {
    #[serde(default)]
    pub ssm_parameter: Option<String>,
}

/// Deserialize `ResourceProperties`; type mismatches become validation errors
pub(crate) fn parse_properties<T: DeserializeOwned>(properties: &Value) -> HandlerResult<T> {
    let result = if properties.is_null() {
        T::deserialize(&Value::Object(serde_json::Map::new()))
    } else {
        T::deserialize(properties)
    };
    result.map_err(|e| HandlerError::validation(format!("Invalid resource properties: {e}")))
}

/// A property that must be present and non-empty
pub(crate) fn required(value: Option<String>, field: &str) -> HandlerResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HandlerError::validation(format!("{field} must be specified")))
}

/// Generate a key pair off the async worker threads
pub(crate) async fn generate_key_pair(
    key_type: KeyType,
    modulus_length: usize,
) -> HandlerResult<GeneratedKeyPair> {
    let pair = tokio::task::spawn_blocking(move || crypto::generate_key_pair(key_type, modulus_length))
        .await
        .context("Key generation task failed")??;
    Ok(pair)
}
