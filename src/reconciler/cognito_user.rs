//! # Cognito User Reconciler
//!
//! `Custom::CognitoUserPoolUser`: a user in a Cognito user pool, optionally
//! with a permanent password.
//!
//! The password comes from a Secrets Manager secret (`SecretId`, JSON with a
//! `password` field) or is generated and written to SSM
//! (`PasswordParameterName`). Without either, Cognito's temporary password
//! flow applies.
//!
//! Physical id: `<userPoolId>/<username>`.

use super::{parse_properties, required};
use crate::cfn::{CreateRequest, DeleteRequest, UpdateRequest};
use crate::constants::PASSWORD_EXCLUDED_CHARACTERS;
use crate::dispatcher::{CustomResourceHandler, HandlerResponse, Outcome};
use crate::error::{HandlerError, HandlerResult};
use crate::provider::{IgnoreNotFound, ParameterKind, ParameterStore, SecretSource, UserPoolAdmin};
use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use zeroize::Zeroizing;

pub const RESOURCE_TYPE: &str = "Custom::CognitoUserPoolUser";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CognitoUserProperties {
    #[serde(default)]
    user_pool_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, deserialize_with = "crate::cfn::values::optional_u32")]
    password_length: Option<u32>,
    #[serde(default)]
    secret_id: Option<String>,
    #[serde(default)]
    password_parameter_name: Option<String>,
}

/// Validated user properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoUserSpec {
    pub user_pool_id: String,
    pub username: String,
    pub password_length: Option<u32>,
    pub secret_id: Option<String>,
    pub password_parameter_name: Option<String>,
}

impl CognitoUserSpec {
    /// # Errors
    ///
    /// Returns [`HandlerError::Validation`] for a missing or malformed pool id
    /// or username.
    pub fn from_properties(properties: &Value) -> HandlerResult<Self> {
        let props: CognitoUserProperties = parse_properties(properties)?;

        let user_pool_id = required(props.user_pool_id, "UserPoolId")?;
        let pool_id_regex = Regex::new(r"^[\w-]+_[0-9a-zA-Z]+$")
            .map_err(|e| anyhow!("Failed to compile regex: {e}"))?;
        if !pool_id_regex.is_match(&user_pool_id) {
            return Err(HandlerError::validation(
                r"UserPoolId does not match the pattern [\w-]+_[0-9a-zA-Z]+",
            ));
        }

        let username = required(props.username, "Username")?;
        let prohibited_regex = Regex::new(r"[^\p{L}\p{M}\p{S}\p{N}\p{P}]")
            .map_err(|e| anyhow!("Failed to compile regex: {e}"))?;
        if let Some(m) = prohibited_regex.find(&username) {
            return Err(HandlerError::validation(format!(
                "Username has prohibited characters {:?}",
                m.as_str()
            )));
        }

        Ok(Self {
            user_pool_id,
            username,
            password_length: props.password_length,
            secret_id: props.secret_id.filter(|s| !s.is_empty()),
            password_parameter_name: props.password_parameter_name.filter(|s| !s.is_empty()),
        })
    }

    #[must_use]
    pub fn physical_resource_id(&self) -> String {
        format!("{}/{}", self.user_pool_id, self.username)
    }
}

/// Split `<userPoolId>/<username>`
///
/// # Errors
///
/// Returns [`HandlerError::MalformedPhysicalId`] when either part is missing.
pub fn parse_physical_resource_id(physical_resource_id: &str) -> HandlerResult<(&str, &str)> {
    physical_resource_id
        .split_once('/')
        .filter(|(pool, user)| !pool.is_empty() && !user.is_empty())
        .ok_or_else(|| HandlerError::MalformedPhysicalId(physical_resource_id.to_string()))
}

#[derive(Deserialize)]
struct SecretPassword {
    password: String,
}

/// Reconciler for `Custom::CognitoUserPoolUser`
#[derive(Clone)]
pub struct CognitoUserHandler {
    users: Arc<dyn UserPoolAdmin>,
    secrets: Arc<dyn SecretSource>,
    parameters: Arc<dyn ParameterStore>,
}

impl std::fmt::Debug for CognitoUserHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitoUserHandler").finish_non_exhaustive()
    }
}

impl CognitoUserHandler {
    pub fn new(
        users: Arc<dyn UserPoolAdmin>,
        secrets: Arc<dyn SecretSource>,
        parameters: Arc<dyn ParameterStore>,
    ) -> Self {
        Self {
            users,
            secrets,
            parameters,
        }
    }

    /// Password from the secret, or a generated one persisted to SSM
    async fn resolve_password(
        &self,
        spec: &CognitoUserSpec,
    ) -> HandlerResult<Option<Zeroizing<String>>> {
        if let Some(secret_id) = &spec.secret_id {
            let secret = self.secrets.get_secret_string(secret_id).await?;
            let parsed: SecretPassword = serde_json::from_str(&secret).map_err(|e| {
                HandlerError::validation(format!("The secret {secret_id} is invalid JSON: {e}"))
            })?;
            return Ok(Some(Zeroizing::new(parsed.password)));
        }

        if let Some(parameter_name) = &spec.password_parameter_name {
            let password = self
                .secrets
                .generate_password(spec.password_length, PASSWORD_EXCLUDED_CHARACTERS)
                .await?;
            self.parameters
                .put_parameter(parameter_name, &password, ParameterKind::SecureString, true)
                .await?;
            info!("Stored generated password for {} in {}", spec.username, parameter_name);
            return Ok(Some(password));
        }

        Ok(None)
    }

    async fn set_password(&self, spec: &CognitoUserSpec) -> HandlerResult<()> {
        let Some(password) = self.resolve_password(spec).await? else {
            info!("No password source for {}, keeping Cognito's temporary password", spec.username);
            return Ok(());
        };

        self.users
            .set_permanent_password(&spec.user_pool_id, &spec.username, &password)
            .await?;
        Ok(())
    }

    /// Create the user and set its password, removing the user again if the
    /// password cannot be set
    async fn create_user(&self, spec: &CognitoUserSpec) -> HandlerResult<()> {
        self.users
            .create_user(&spec.user_pool_id, &spec.username)
            .await?;
        info!("Created user {} in {}", spec.username, spec.user_pool_id);

        if let Err(e) = self.set_password(spec).await {
            match self
                .users
                .delete_user(&spec.user_pool_id, &spec.username)
                .await
                .ignore_not_found()
            {
                Ok(_) => info!("Removed user {} after failing to set its password", spec.username),
                Err(cleanup) => error!(
                    "Failed to remove user {} after failing to set its password: {}",
                    spec.username, cleanup
                ),
            }
            return Err(e);
        }
        Ok(())
    }

    fn response(spec: &CognitoUserSpec) -> HandlerResponse {
        HandlerResponse::new(spec.physical_resource_id()).with_data("Username", spec.username.as_str())
    }
}

#[async_trait]
impl CustomResourceHandler for CognitoUserHandler {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, request: &CreateRequest) -> HandlerResult<Outcome> {
        let spec = CognitoUserSpec::from_properties(&request.resource_properties)?;
        self.create_user(&spec).await?;
        Ok(Self::response(&spec).into())
    }

    async fn update(&self, request: &UpdateRequest) -> HandlerResult<Outcome> {
        let spec = CognitoUserSpec::from_properties(&request.resource_properties)?;
        let old = CognitoUserSpec::from_properties(&request.old_resource_properties).ok();

        match old {
            Some(old) if old == spec => {
                return Ok(HandlerResponse::new(request.physical_resource_id.clone())
                    .with_data("Username", spec.username.as_str())
                    .with_reason("The resource has not been modified")
                    .into());
            }
            Some(old) if old.user_pool_id == spec.user_pool_id && old.username == spec.username => {
                self.set_password(&spec).await?;
                info!("Reset password of {} in {}", spec.username, spec.user_pool_id);
            }
            _ => {
                // Pool or username changed: a new user; the old one goes with
                // the replacement's Delete
                self.create_user(&spec).await?;
            }
        }

        Ok(Self::response(&spec).into())
    }

    async fn delete(&self, request: &DeleteRequest) -> HandlerResult<Outcome> {
        let (user_pool_id, username) = parse_physical_resource_id(&request.physical_resource_id)?;

        if self
            .users
            .delete_user(user_pool_id, username)
            .await
            .ignore_not_found()?
        {
            info!("Deleted user {} from {}", username, user_pool_id);
        }

        Ok(HandlerResponse::new(request.physical_resource_id.clone())
            .with_reason("The resource has been deleted")
            .into())
    }
}
