//! # AWS Cognito User Pool Client
//!
//! Admin-side user management for Cognito user pools: create a user, set a
//! permanent password, delete a user.

use crate::provider::aws::service_error;
use crate::provider::{ProviderError, ProviderResult, UserPoolAdmin};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use tracing::{info, info_span, Instrument};

/// Cognito user pool admin implementation
#[derive(Clone)]
pub struct CognitoUserPool {
    client: CognitoClient,
}

impl std::fmt::Debug for CognitoUserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitoUserPool").finish_non_exhaustive()
    }
}

impl CognitoUserPool {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: CognitoClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl UserPoolAdmin for CognitoUserPool {
    async fn create_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()> {
        let span = info_span!(
            "aws.cognito.admin_create_user",
            user_pool.id = user_pool_id,
            user.name = username
        );

        async move {
            info!("Creating Cognito user {} in {}", username, user_pool_id);
            self.client
                .admin_create_user()
                .user_pool_id(user_pool_id)
                .username(username)
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to create Cognito user {username} in {user_pool_id}"),
                        e.into_service_error(),
                    )
                })?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn set_permanent_password(
        &self,
        user_pool_id: &str,
        username: &str,
        password: &str,
    ) -> ProviderResult<()> {
        let span = info_span!(
            "aws.cognito.admin_set_user_password",
            user_pool.id = user_pool_id,
            user.name = username
        );

        async move {
            info!("Setting permanent password for Cognito user {}", username);
            match self
                .client
                .admin_set_user_password()
                .user_pool_id(user_pool_id)
                .username(username)
                .password(password)
                .permanent(true)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_user_not_found_exception() {
                        Err(ProviderError::not_found(
                            "Cognito user",
                            format!("{user_pool_id}/{username}"),
                        ))
                    } else {
                        Err(service_error(
                            &format!("Failed to set password for Cognito user {username}"),
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

    async fn delete_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()> {
        let span = info_span!(
            "aws.cognito.admin_delete_user",
            user_pool.id = user_pool_id,
            user.name = username
        );

        async move {
            info!("Deleting Cognito user {} from {}", username, user_pool_id);
            match self
                .client
                .admin_delete_user()
                .user_pool_id(user_pool_id)
                .username(username)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_user_not_found_exception() {
                        Err(ProviderError::not_found(
                            "Cognito user",
                            format!("{user_pool_id}/{username}"),
                        ))
                    } else {
                        Err(service_error(
                            &format!("Failed to delete Cognito user {username}"),
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
