//! # AWS Lambda Layer Client

use crate::provider::aws::service_error;
use crate::provider::{LayerRegistry, ProviderError, ProviderResult};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::Client as LambdaClient;
use tracing::{info, info_span, Instrument};

/// Lambda backed layer registry
#[derive(Clone)]
pub struct LambdaLayers {
    client: LambdaClient,
}

impl std::fmt::Debug for LambdaLayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaLayers").finish_non_exhaustive()
    }
}

impl LambdaLayers {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: LambdaClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl LayerRegistry for LambdaLayers {
    async fn delete_layer_version(
        &self,
        layer_name: &str,
        version_number: i64,
    ) -> ProviderResult<()> {
        let span = info_span!(
            "aws.lambda.delete_layer_version",
            layer.name = layer_name,
            layer.version = version_number
        );

        async move {
            info!("Deleting layer version {}:{}", layer_name, version_number);
            match self
                .client
                .delete_layer_version()
                .layer_name(layer_name)
                .version_number(version_number)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.code() == Some("ResourceNotFoundException") {
                        Err(ProviderError::not_found(
                            "Layer version",
                            format!("{layer_name}:{version_number}"),
                        ))
                    } else {
                        Err(service_error(
                            &format!(
                                "Failed to delete layer version {layer_name}:{version_number}"
                            ),
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
