//! # AWS Secrets Manager Client
//!
//! Reads secret strings and generates random passwords through Secrets Manager.

use crate::provider::aws::service_error;
use crate::provider::{ProviderError, ProviderResult, SecretSource};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

/// Secrets Manager backed secret source
#[derive(Clone)]
pub struct SecretsManagerSource {
    client: SecretsManagerClient,
}

impl std::fmt::Debug for SecretsManagerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerSource").finish_non_exhaustive()
    }
}

impl SecretsManagerSource {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: SecretsManagerClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl SecretSource for SecretsManagerSource {
    async fn get_secret_string(&self, secret_id: &str) -> ProviderResult<Zeroizing<String>> {
        let span = info_span!("aws.secretsmanager.get_secret_value", secret.id = secret_id);

        async move {
            debug!("Reading secret {}", secret_id);
            let output = match self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .send()
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_resource_not_found_exception() {
                        return Err(ProviderError::not_found("Secret", secret_id));
                    }
                    return Err(
                        service_error(&format!("Failed to read secret {secret_id}"), e).into(),
                    );
                }
            };

            output
                .secret_string()
                .filter(|value| !value.is_empty())
                .map(|value| Zeroizing::new(value.to_string()))
                .ok_or_else(|| {
                    ProviderError::from(anyhow::anyhow!("The secret {secret_id} is empty"))
                })
        }
        .instrument(span)
        .await
    }

    async fn generate_password(
        &self,
        length: Option<u32>,
        exclude_characters: &str,
    ) -> ProviderResult<Zeroizing<String>> {
        let span = info_span!("aws.secretsmanager.get_random_password");

        async move {
            let output = self
                .client
                .get_random_password()
                .exclude_characters(exclude_characters)
                .set_password_length(length.map(i64::from))
                .send()
                .await
                .map_err(|e| {
                    service_error("Failed to generate a random password", e.into_service_error())
                })?;

            output
                .random_password()
                .filter(|password| !password.is_empty())
                .map(|password| Zeroizing::new(password.to_string()))
                .ok_or_else(|| {
                    ProviderError::from(anyhow::anyhow!(
                        "secretsmanager.getRandomPassword() returns empty password"
                    ))
                })
        }
        .instrument(span)
        .await
    }
}
