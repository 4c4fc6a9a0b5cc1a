//! # Key-Pair Reconciler
//!
//! `Custom::KeyPair`: an asymmetric key pair kept in SSM Parameter Store,
//! private half as a `SecureString`, public half as a plain `String`.
//!
//! The physical id is the private key parameter path. Moving the private key
//! therefore replaces the resource, and CloudFormation cleans up the old
//! parameters with a Delete carrying the old properties.

use super::{generate_key_pair, parse_properties, required, SsmParameterRef};
use crate::cfn::{CreateRequest, DeleteRequest, UpdateRequest};
use crate::constants::{MAX_RSA_MODULUS_LENGTH, MIN_RSA_MODULUS_LENGTH};
use crate::crypto::KeyType;
use crate::dispatcher::{CustomResourceHandler, HandlerResponse, Outcome};
use crate::error::{HandlerError, HandlerResult};
use crate::provider::{IgnoreNotFound, ParameterKind, ParameterStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

pub const RESOURCE_TYPE: &str = "Custom::KeyPair";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairProperties {
    #[serde(default, rename = "Type")]
    key_type: Option<String>,
    #[serde(default, deserialize_with = "crate::cfn::values::optional_u32")]
    modulus_length: Option<u32>,
    #[serde(default)]
    private_key: Option<SsmParameterRef>,
    #[serde(default)]
    public_key: Option<SsmParameterRef>,
}

/// Validated key pair properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairSpec {
    pub key_type: KeyType,
    pub modulus_length: u32,
    pub private_key_parameter: String,
    pub public_key_parameter: String,
}

impl KeyPairSpec {
    /// # Errors
    ///
    /// Returns [`HandlerError::Validation`] naming the first missing or
    /// invalid property.
    pub fn from_properties(properties: &Value) -> HandlerResult<Self> {
        let props: KeyPairProperties = parse_properties(properties)?;

        let key_type = required(props.key_type, "Type")?;
        let modulus_length = props
            .modulus_length
            .ok_or_else(|| HandlerError::validation("ModulusLength must be a number"))?;
        let private_key = props
            .private_key
            .ok_or_else(|| HandlerError::validation("PrivateKey must be specified"))?;
        let private_key_parameter =
            required(private_key.ssm_parameter, "PrivateKey.SsmParameter")?;
        let public_key = props
            .public_key
            .ok_or_else(|| HandlerError::validation("PublicKey must be specified"))?;
        let public_key_parameter = required(public_key.ssm_parameter, "PublicKey.SsmParameter")?;

        let key_type = key_type
            .parse::<KeyType>()
            .map_err(|e| HandlerError::validation(e.to_string()))?;

        if !(MIN_RSA_MODULUS_LENGTH..=MAX_RSA_MODULUS_LENGTH).contains(&modulus_length) {
            return Err(HandlerError::validation(format!(
                "ModulusLength must be between {MIN_RSA_MODULUS_LENGTH} and {MAX_RSA_MODULUS_LENGTH}"
            )));
        }

        if private_key_parameter == public_key_parameter {
            return Err(HandlerError::validation(
                "PrivateKey.SsmParameter and PublicKey.SsmParameter must be different",
            ));
        }

        Ok(Self {
            key_type,
            modulus_length,
            private_key_parameter,
            public_key_parameter,
        })
    }
}

/// Reconciler for `Custom::KeyPair`
#[derive(Clone)]
pub struct KeyPairHandler {
    parameters: Arc<dyn ParameterStore>,
}

impl std::fmt::Debug for KeyPairHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairHandler").finish_non_exhaustive()
    }
}

impl KeyPairHandler {
    pub fn new(parameters: Arc<dyn ParameterStore>) -> Self {
        Self { parameters }
    }

    /// Generate a fresh pair and write both halves
    ///
    /// A private key written without `overwrite_private` is fresh, so it is
    /// deleted again when the public write fails. A failed private write
    /// never deletes anything, since that parameter is not ours.
    async fn put_key_pair(
        &self,
        spec: &KeyPairSpec,
        overwrite_private: bool,
        overwrite_public: bool,
    ) -> HandlerResult<()> {
        let pair = generate_key_pair(spec.key_type, spec.modulus_length as usize).await?;

        self.parameters
            .put_parameter(
                &spec.private_key_parameter,
                &pair.private_key_pem,
                ParameterKind::SecureString,
                overwrite_private,
            )
            .await?;

        if let Err(e) = self
            .parameters
            .put_parameter(
                &spec.public_key_parameter,
                &pair.public_key_pem,
                ParameterKind::String,
                overwrite_public,
            )
            .await
        {
            if !overwrite_private {
                self.remove_orphaned_private_key(&spec.private_key_parameter)
                    .await;
            }
            return Err(e.into());
        }

        info!(
            "Stored {} key pair in {} and {}",
            spec.key_type, spec.private_key_parameter, spec.public_key_parameter
        );
        Ok(())
    }

    /// Drop a private key whose public half could not be written
    async fn remove_orphaned_private_key(&self, name: &str) {
        // A leftover private key would block the next attempt, which never
        // overwrites it
        if let Err(cleanup) = self.parameters.delete_parameter(name).await.ignore_not_found() {
            error!("Failed to remove {} after the public key write failed: {}", name, cleanup);
        }
    }

    async fn delete_parameter(&self, name: &str) -> HandlerResult<()> {
        if self.parameters.delete_parameter(name).await.ignore_not_found()? {
            info!("Deleted parameter {}", name);
        }
        Ok(())
    }
}

#[async_trait]
impl CustomResourceHandler for KeyPairHandler {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, request: &CreateRequest) -> HandlerResult<Outcome> {
        let spec = KeyPairSpec::from_properties(&request.resource_properties)?;

        self.put_key_pair(&spec, false, false).await?;

        Ok(HandlerResponse::new(spec.private_key_parameter).into())
    }

    async fn update(&self, request: &UpdateRequest) -> HandlerResult<Outcome> {
        let spec = KeyPairSpec::from_properties(&request.resource_properties)?;
        let old = KeyPairSpec::from_properties(&request.old_resource_properties).ok();

        match old {
            Some(old) if old == spec => {
                info!("Key pair {} has not been modified", request.physical_resource_id);
                return Ok(HandlerResponse::new(request.physical_resource_id.clone())
                    .with_reason("This resource has not been modified")
                    .into());
            }
            Some(old) if old.private_key_parameter != spec.private_key_parameter => {
                if old.public_key_parameter == spec.public_key_parameter {
                    return Err(HandlerError::validation(
                        "PublicKey.SsmParameter must be changed at the same time as PrivateKey.SsmParameter",
                    ));
                }
                // New physical id; the old pair goes with the replacement's Delete
                self.put_key_pair(&spec, false, false).await?;
            }
            Some(old) => {
                let public_moved = old.public_key_parameter != spec.public_key_parameter;
                self.put_key_pair(&spec, true, !public_moved).await?;
                if public_moved {
                    self.delete_parameter(&old.public_key_parameter).await?;
                }
            }
            None => {
                self.put_key_pair(&spec, true, true).await?;
            }
        }

        Ok(HandlerResponse::new(spec.private_key_parameter).into())
    }

    async fn delete(&self, request: &DeleteRequest) -> HandlerResult<Outcome> {
        let props: KeyPairProperties =
            parse_properties(&request.resource_properties).unwrap_or_default();

        let private_key_parameter = props
            .private_key
            .and_then(|p| p.ssm_parameter)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| request.physical_resource_id.clone());
        let public_key_parameter = props
            .public_key
            .and_then(|p| p.ssm_parameter)
            .filter(|p| !p.is_empty());

        self.delete_parameter(&private_key_parameter).await?;
        if let Some(public_key_parameter) = public_key_parameter {
            self.delete_parameter(&public_key_parameter).await?;
        }

        Ok(HandlerResponse::new(request.physical_resource_id.clone())
            .with_reason("SSM parameters have been deleted")
            .into())
    }
}
