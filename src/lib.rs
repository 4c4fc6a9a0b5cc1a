//! CloudFormation Custom Resource Handlers
//!
//! Reconcilers for the `Custom::KeyPair`, `Custom::CloudFrontKeyPair`,
//! `Custom::CognitoUserPoolUser` and `Custom::NodejsLayerVersion` custom
//! resources, the lifecycle dispatcher they share, and the callback to
//! CloudFormation's presigned response URL.
//!
//! Backing services sit behind the capability traits in [`provider`]; the
//! AWS SDK implementations live in [`provider::aws`].

pub mod cfn;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod reconciler;
pub mod runtime;
