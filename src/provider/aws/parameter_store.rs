//! # AWS Parameter Store Client
//!
//! Client for interacting with AWS Systems Manager Parameter Store API.
//!
//! This module provides functionality to:
//! - Write plain and `SecureString` parameters, optionally overwriting
//! - Read parameter values with decryption
//! - Delete parameters, reporting `ParameterNotFound` as [`ProviderError::NotFound`]

use crate::provider::aws::service_error;
use crate::provider::{ParameterKind, ParameterStore, ProviderError, ProviderResult};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client as SsmClient;
use tracing::{debug, info, info_span, Instrument};
use zeroize::Zeroizing;

/// AWS Parameter Store provider implementation
#[derive(Clone)]
pub struct SsmParameterStore {
    client: SsmClient,
}

impl std::fmt::Debug for SsmParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsmParameterStore").finish_non_exhaustive()
    }
}

impl SsmParameterStore {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: SsmClient::new(sdk_config),
        }
    }
}

impl From<ParameterKind> for ParameterType {
    fn from(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::String => ParameterType::String,
            ParameterKind::SecureString => ParameterType::SecureString,
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        kind: ParameterKind,
        overwrite: bool,
    ) -> ProviderResult<()> {
        let span = info_span!("aws.ssm.put_parameter", parameter.name = name, overwrite);

        async move {
            info!("Writing AWS Parameter Store parameter: {}", name);
            self.client
                .put_parameter()
                .name(name)
                .value(value)
                .r#type(kind.into())
                .overwrite(overwrite)
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to write AWS Parameter Store parameter {name}"),
                        e.into_service_error(),
                    )
                })?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn get_parameter(&self, name: &str) -> ProviderResult<Zeroizing<String>> {
        let span = info_span!("aws.ssm.get_parameter", parameter.name = name);

        async move {
            debug!("Reading AWS Parameter Store parameter: {}", name);
            match self
                .client
                .get_parameter()
                .name(name)
                .with_decryption(true) // Decrypt SecureString parameters
                .send()
                .await
            {
                Ok(response) => response
                    .parameter()
                    .and_then(|parameter| parameter.value())
                    .map(|value| Zeroizing::new(value.to_string()))
                    .ok_or_else(|| ProviderError::not_found("Parameter", name)),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_parameter_not_found() {
                        Err(ProviderError::not_found("Parameter", name))
                    } else {
                        Err(service_error(
                            &format!("Failed to read AWS Parameter Store parameter {name}"),
                            e,
                        )
                        .into())
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn delete_parameter(&self, name: &str) -> ProviderResult<()> {
        let span = info_span!("aws.ssm.delete_parameter", parameter.name = name);

        async move {
            info!("Deleting AWS Parameter Store parameter: {}", name);
            match self.client.delete_parameter().name(name).send().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_parameter_not_found() {
                        Err(ProviderError::not_found("Parameter", name))
                    } else {
                        Err(service_error(
                            &format!("Failed to delete AWS Parameter Store parameter {name}"),
                            e,
                        )
                        .into())
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
