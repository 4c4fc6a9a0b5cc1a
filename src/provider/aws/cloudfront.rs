//! # AWS CloudFront Public Key Client
//!
//! Registers, updates and deletes CloudFront public keys (the key-pair
//! registry used for signed URLs and signed cookies).
//!
//! Updates and deletes are guarded by the key's ETag; callers fetch it with
//! [`PublicKeyRegistry::get_public_key`] first.

use crate::provider::aws::service_error;
use crate::provider::{
    ProviderError, ProviderResult, PublicKeyConfig, PublicKeyEntry, PublicKeyRegistry,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudfront::types::PublicKeyConfig as SdkPublicKeyConfig;
use aws_sdk_cloudfront::Client as CloudFrontClient;
use tracing::{debug, info, info_span, Instrument};

/// CloudFront public key registry implementation
#[derive(Clone)]
pub struct CloudFrontPublicKeys {
    client: CloudFrontClient,
}

impl std::fmt::Debug for CloudFrontPublicKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontPublicKeys").finish_non_exhaustive()
    }
}

impl CloudFrontPublicKeys {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: CloudFrontClient::new(sdk_config),
        }
    }
}

fn to_sdk_config(config: &PublicKeyConfig) -> anyhow::Result<SdkPublicKeyConfig> {
    SdkPublicKeyConfig::builder()
        .caller_reference(&config.caller_reference)
        .name(&config.name)
        .encoded_key(&config.encoded_key)
        .set_comment(config.comment.clone())
        .build()
        .context("Invalid CloudFront public key config")
}

#[async_trait]
impl PublicKeyRegistry for CloudFrontPublicKeys {
    async fn create_public_key(&self, config: &PublicKeyConfig) -> ProviderResult<String> {
        let span = info_span!("aws.cloudfront.create_public_key", public_key.name = %config.name);

        async move {
            info!("Registering CloudFront public key: {}", config.name);
            let output = self
                .client
                .create_public_key()
                .public_key_config(to_sdk_config(config)?)
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to create CloudFront public key {}", config.name),
                        e.into_service_error(),
                    )
                })?;

            let id = output
                .public_key()
                .map(|key| key.id().to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("PublicKey.Id is not returned from CloudFront API")
                })?;

            info!("Registered CloudFront public key {} as {}", config.name, id);
            Ok(id)
        }
        .instrument(span)
        .await
    }

    async fn get_public_key(&self, id: &str) -> ProviderResult<PublicKeyEntry> {
        let span = info_span!("aws.cloudfront.get_public_key", public_key.id = id);

        async move {
            debug!("Fetching CloudFront public key: {}", id);
            let output = match self.client.get_public_key().id(id).send().await {
                Ok(output) => output,
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_no_such_public_key() {
                        return Err(ProviderError::not_found("CloudFront public key", id));
                    }
                    return Err(service_error(
                        &format!("Failed to get CloudFront public key {id}"),
                        e,
                    )
                    .into());
                }
            };

            let etag = output
                .e_tag()
                .map(ToString::to_string)
                .ok_or_else(|| anyhow::anyhow!("ETag is not returned for public key {id}"))?;
            let config = output
                .public_key()
                .and_then(|key| key.public_key_config())
                .ok_or_else(|| {
                    anyhow::anyhow!("PublicKeyConfig is not returned for public key {id}")
                })?;

            Ok(PublicKeyEntry {
                id: id.to_string(),
                config: PublicKeyConfig {
                    caller_reference: config.caller_reference().to_string(),
                    name: config.name().to_string(),
                    encoded_key: config.encoded_key().to_string(),
                    comment: config.comment().map(ToString::to_string),
                },
                etag,
            })
        }
        .instrument(span)
        .await
    }

    async fn update_public_key(
        &self,
        id: &str,
        etag: &str,
        config: &PublicKeyConfig,
    ) -> ProviderResult<()> {
        let span = info_span!("aws.cloudfront.update_public_key", public_key.id = id);

        async move {
            info!("Updating CloudFront public key {} ({})", id, config.name);
            match self
                .client
                .update_public_key()
                .id(id)
                .if_match(etag)
                .public_key_config(to_sdk_config(config)?)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_no_such_public_key() {
                        Err(ProviderError::not_found("CloudFront public key", id))
                    } else {
                        Err(service_error(
                            &format!("Failed to update CloudFront public key {id}"),
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

    async fn delete_public_key(&self, id: &str, etag: &str) -> ProviderResult<()> {
        let span = info_span!("aws.cloudfront.delete_public_key", public_key.id = id);

        async move {
            info!("Deleting CloudFront public key: {}", id);
            match self
                .client
                .delete_public_key()
                .id(id)
                .if_match(etag)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_no_such_public_key() {
                        Err(ProviderError::not_found("CloudFront public key", id))
                    } else {
                        Err(service_error(
                            &format!("Failed to delete CloudFront public key {id}"),
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

    async fn find_public_key_by_name(&self, name: &str) -> ProviderResult<Option<String>> {
        let span = info_span!("aws.cloudfront.list_public_keys", public_key.name = name);

        async move {
            let mut marker: Option<String> = None;
            loop {
                let output = self
                    .client
                    .list_public_keys()
                    .set_marker(marker.take())
                    .send()
                    .await
                    .map_err(|e| {
                        service_error("Failed to list CloudFront public keys", e.into_service_error())
                    })?;

                let Some(list) = output.public_key_list() else {
                    return Ok(None);
                };

                if let Some(summary) = list.items().iter().find(|s| s.name() == name) {
                    debug!("Resolved CloudFront public key {} to {}", name, summary.id());
                    return Ok(Some(summary.id().to_string()));
                }

                match list.next_marker() {
                    Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                    _ => return Ok(None),
                }
            }
        }
        .instrument(span)
        .await
    }
}
