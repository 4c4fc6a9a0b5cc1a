//! # CloudFront Key-Pair Reconciler
//!
//! `Custom::CloudFrontKeyPair`: a 2048 bit RSA key whose private half lives
//! in an SSM `SecureString` and whose public half is registered as a
//! CloudFront public key (for signed URLs and cookies).
//!
//! ## Physical ids
//!
//! New resources use the CloudFront public key id. Resources created by
//! older releases carry the private key parameter path instead (it starts
//! with `/`); for those the key id is looked up by name and the path id is
//! kept so CloudFormation never sees a replacement.
//!
//! ## Updates
//!
//! Updates never register a second key. Moving `PrivateKey.SsmParameter`
//! copies the key bytes to the new parameter and deletes the old one; a
//! name or comment change is applied to the registered key in place.

use super::{generate_key_pair, parse_properties, required, SsmParameterRef};
use crate::cfn::{CreateRequest, DeleteRequest, UpdateRequest};
use crate::constants::CLOUDFRONT_RSA_MODULUS_LENGTH;
use crate::crypto::{public_key_from_private, KeyType};
use crate::dispatcher::{CustomResourceHandler, HandlerResponse, Outcome};
use crate::error::{HandlerError, HandlerResult};
use crate::provider::{
    IgnoreNotFound, ParameterKind, ParameterStore, ProviderError, PublicKeyConfig,
    PublicKeyRegistry,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const RESOURCE_TYPE: &str = "Custom::CloudFrontKeyPair";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CloudFrontKeyPairProperties {
    #[serde(default)]
    private_key: Option<SsmParameterRef>,
    #[serde(default)]
    public_key: Option<PublicKeyProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublicKeyProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

/// Validated CloudFront key pair properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudFrontKeyPairSpec {
    pub private_key_parameter: String,
    /// Registry name; defaults to the logical id
    pub public_key_name: String,
    pub comment: Option<String>,
}

impl CloudFrontKeyPairSpec {
    /// # Errors
    ///
    /// Returns [`HandlerError::Validation`] when the private key parameter is
    /// missing or the name is not acceptable to CloudFront.
    pub fn from_properties(properties: &Value, logical_resource_id: &str) -> HandlerResult<Self> {
        let props: CloudFrontKeyPairProperties = parse_properties(properties)?;

        let private_key = props
            .private_key
            .ok_or_else(|| HandlerError::validation("PrivateKey must be specified"))?;
        let private_key_parameter =
            required(private_key.ssm_parameter, "PrivateKey.SsmParameter")?;

        let public_key = props.public_key.unwrap_or_default();
        let public_key_name = public_key
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| logical_resource_id.to_string());

        if public_key_name.len() > 128
            || !public_key_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HandlerError::validation(format!(
                "PublicKey.Name {public_key_name} must be 1 to 128 characters of A-Z, a-z, 0-9, '-' or '_'"
            )));
        }

        Ok(Self {
            private_key_parameter,
            public_key_name,
            comment: public_key.comment.filter(|c| !c.is_empty()),
        })
    }
}

/// Physical id written by older releases (the private key parameter path)
fn is_legacy_physical_id(physical_resource_id: &str) -> bool {
    physical_resource_id.starts_with('/')
}

/// Reconciler for `Custom::CloudFrontKeyPair`
#[derive(Clone)]
pub struct CloudFrontKeyPairHandler {
    parameters: Arc<dyn ParameterStore>,
    registry: Arc<dyn PublicKeyRegistry>,
    modulus_length: usize,
}

impl std::fmt::Debug for CloudFrontKeyPairHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontKeyPairHandler")
            .field("modulus_length", &self.modulus_length)
            .finish_non_exhaustive()
    }
}

impl CloudFrontKeyPairHandler {
    pub fn new(parameters: Arc<dyn ParameterStore>, registry: Arc<dyn PublicKeyRegistry>) -> Self {
        Self {
            parameters,
            registry,
            modulus_length: CLOUDFRONT_RSA_MODULUS_LENGTH,
        }
    }

    /// Override the generated key size (smaller keys keep tests fast)
    #[must_use]
    pub fn with_modulus_length(mut self, modulus_length: usize) -> Self {
        self.modulus_length = modulus_length;
        self
    }

    /// Registry id behind a physical id
    async fn resolve_public_key_id(
        &self,
        physical_resource_id: &str,
        public_key_name: &str,
    ) -> HandlerResult<Option<String>> {
        if !is_legacy_physical_id(physical_resource_id) {
            return Ok(Some(physical_resource_id.to_string()));
        }

        let id = self.registry.find_public_key_by_name(public_key_name).await?;
        if id.is_none() {
            warn!(
                "No CloudFront public key named {} for {}",
                public_key_name, physical_resource_id
            );
        }
        Ok(id)
    }

    fn response(
        physical_resource_id: impl Into<String>,
        public_key_id: &str,
        spec: &CloudFrontKeyPairSpec,
    ) -> HandlerResponse {
        HandlerResponse::new(physical_resource_id)
            .with_data("PublicKeyId", public_key_id)
            .with_data("PrivateKeyParameter", spec.private_key_parameter.as_str())
    }

    /// Copy the private key to its new parameter and drop the old one
    async fn move_private_key(
        &self,
        public_key_id: &str,
        old_parameter: &str,
        new_parameter: &str,
    ) -> HandlerResult<()> {
        let private_key = self.parameters.get_parameter(old_parameter).await?;

        let registered = self.registry.get_public_key(public_key_id).await?;
        let derived = public_key_from_private(&private_key)?;
        if derived.trim() != registered.config.encoded_key.trim() {
            warn!(
                "Private key in {} does not match CloudFront public key {}",
                old_parameter, public_key_id
            );
        }

        self.parameters
            .put_parameter(
                new_parameter,
                &private_key,
                ParameterKind::SecureString,
                false,
            )
            .await?;

        if self
            .parameters
            .delete_parameter(old_parameter)
            .await
            .ignore_not_found()?
        {
            info!("Moved private key from {} to {}", old_parameter, new_parameter);
        }
        Ok(())
    }

    /// Apply a name or comment change to the registered key
    async fn update_registration(
        &self,
        public_key_id: &str,
        spec: &CloudFrontKeyPairSpec,
    ) -> HandlerResult<()> {
        let entry = self.registry.get_public_key(public_key_id).await?;
        let config = PublicKeyConfig {
            name: spec.public_key_name.clone(),
            comment: spec.comment.clone(),
            ..entry.config
        };

        self.registry
            .update_public_key(public_key_id, &entry.etag, &config)
            .await?;
        info!("Updated CloudFront public key {}", public_key_id);
        Ok(())
    }
}

#[async_trait]
impl CustomResourceHandler for CloudFrontKeyPairHandler {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, request: &CreateRequest) -> HandlerResult<Outcome> {
        let spec = CloudFrontKeyPairSpec::from_properties(
            &request.resource_properties,
            &request.context.logical_resource_id,
        )?;

        let pair = generate_key_pair(KeyType::Rsa, self.modulus_length).await?;

        self.parameters
            .put_parameter(
                &spec.private_key_parameter,
                &pair.private_key_pem,
                ParameterKind::SecureString,
                false,
            )
            .await?;

        let config = PublicKeyConfig {
            caller_reference: request.context.request_id.clone(),
            name: spec.public_key_name.clone(),
            encoded_key: pair.public_key_pem.clone(),
            comment: spec.comment.clone(),
        };

        let public_key_id = match self.registry.create_public_key(&config).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self
                    .parameters
                    .delete_parameter(&spec.private_key_parameter)
                    .await
                    .ignore_not_found()
                {
                    error!(
                        "Failed to remove {} after CloudFront rejected the public key: {}",
                        spec.private_key_parameter, cleanup
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            "Registered CloudFront public key {} as {}",
            spec.public_key_name, public_key_id
        );
        Ok(Self::response(public_key_id.clone(), &public_key_id, &spec).into())
    }

    async fn update(&self, request: &UpdateRequest) -> HandlerResult<Outcome> {
        let logical_resource_id = &request.context.logical_resource_id;
        let spec =
            CloudFrontKeyPairSpec::from_properties(&request.resource_properties, logical_resource_id)?;
        let old = CloudFrontKeyPairSpec::from_properties(
            &request.old_resource_properties,
            logical_resource_id,
        )
        .ok();

        let Some(old) = old else {
            return Err(HandlerError::validation(
                "OldResourceProperties are invalid; cannot locate the current private key",
            ));
        };

        if old == spec {
            // Legacy path ids are not resolved here, so they carry no key id
            let physical_resource_id = request.physical_resource_id.as_str();
            let response = if is_legacy_physical_id(physical_resource_id) {
                HandlerResponse::new(physical_resource_id)
                    .with_data("PrivateKeyParameter", spec.private_key_parameter.as_str())
            } else {
                Self::response(physical_resource_id, physical_resource_id, &spec)
            };
            return Ok(response
                .with_reason("This resource has not been modified")
                .into());
        }

        let lookup_name = old.public_key_name.as_str();
        let public_key_id = self
            .resolve_public_key_id(&request.physical_resource_id, lookup_name)
            .await?
            .ok_or_else(|| {
                HandlerError::Provider(ProviderError::not_found("CloudFront public key", lookup_name))
            })?;

        if old.private_key_parameter != spec.private_key_parameter {
            self.move_private_key(
                &public_key_id,
                &old.private_key_parameter,
                &spec.private_key_parameter,
            )
            .await?;
        }

        if old.public_key_name != spec.public_key_name || old.comment != spec.comment {
            self.update_registration(&public_key_id, &spec).await?;
        }

        Ok(Self::response(request.physical_resource_id.clone(), &public_key_id, &spec).into())
    }

    async fn delete(&self, request: &DeleteRequest) -> HandlerResult<Outcome> {
        let props: CloudFrontKeyPairProperties =
            parse_properties(&request.resource_properties).unwrap_or_default();
        let physical_resource_id = request.physical_resource_id.as_str();

        let private_key_parameter = props
            .private_key
            .and_then(|p| p.ssm_parameter)
            .filter(|p| !p.is_empty())
            .or_else(|| {
                is_legacy_physical_id(physical_resource_id).then(|| physical_resource_id.to_string())
            });

        if let Some(parameter) = private_key_parameter {
            if self
                .parameters
                .delete_parameter(&parameter)
                .await
                .ignore_not_found()?
            {
                info!("Deleted parameter {}", parameter);
            }
        }

        let public_key_name = props
            .public_key
            .and_then(|p| p.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| request.context.logical_resource_id.clone());

        if let Some(id) = self
            .resolve_public_key_id(physical_resource_id, &public_key_name)
            .await?
        {
            match self.registry.get_public_key(&id).await {
                Ok(entry) => {
                    if self
                        .registry
                        .delete_public_key(&id, &entry.etag)
                        .await
                        .ignore_not_found()?
                    {
                        info!("Deleted CloudFront public key {}", id);
                    }
                }
                Err(e) if e.is_not_found() => {
                    warn!("CloudFront public key {} does not exist", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(HandlerResponse::new(physical_resource_id)
            .with_reason("SSM parameter and CloudFront public key have been deleted")
            .into())
    }
}
