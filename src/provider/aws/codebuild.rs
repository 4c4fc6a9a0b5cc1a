//! # AWS CodeBuild Client
//!
//! Starts builds with an overridden buildspec and reports their status.

use crate::provider::aws::service_error;
use crate::provider::{
    BuildRequest, BuildService, BuildState, BuildStatus, ProviderError, ProviderResult,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_codebuild::types::{
    BuildPhaseType, EnvironmentVariable, EnvironmentVariableType, StatusType,
};
use aws_sdk_codebuild::Client as CodeBuildClient;
use tracing::{debug, info, info_span, Instrument};

/// CodeBuild backed build service
#[derive(Clone)]
pub struct CodeBuildService {
    client: CodeBuildClient,
}

impl std::fmt::Debug for CodeBuildService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBuildService").finish_non_exhaustive()
    }
}

impl CodeBuildService {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: CodeBuildClient::new(sdk_config),
        }
    }
}

impl From<&StatusType> for BuildStatus {
    fn from(status: &StatusType) -> Self {
        match status {
            StatusType::InProgress => BuildStatus::InProgress,
            StatusType::Succeeded => BuildStatus::Succeeded,
            StatusType::Failed => BuildStatus::Failed,
            StatusType::Fault => BuildStatus::Fault,
            StatusType::Stopped => BuildStatus::Stopped,
            StatusType::TimedOut => BuildStatus::TimedOut,
            other => BuildStatus::Unknown(other.as_str().to_string()),
        }
    }
}

#[async_trait]
impl BuildService for CodeBuildService {
    async fn start_build(&self, request: &BuildRequest) -> ProviderResult<String> {
        let span = info_span!("aws.codebuild.start_build", project.name = %request.project_name);

        async move {
            let environment = request
                .environment
                .iter()
                .map(|(name, value)| {
                    EnvironmentVariable::builder()
                        .name(name)
                        .value(value)
                        .r#type(EnvironmentVariableType::Plaintext)
                        .build()
                })
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid build environment variable")?;

            let output = self
                .client
                .start_build()
                .project_name(&request.project_name)
                .buildspec_override(&request.buildspec)
                .set_environment_variables_override(Some(environment))
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to start build in {}", request.project_name),
                        e.into_service_error(),
                    )
                })?;

            let build_id = output
                .build_value()
                .and_then(|build| build.id())
                .map(ToString::to_string)
                .ok_or_else(|| anyhow::anyhow!("Missing build ID"))?;

            info!("Started build {}", build_id);
            Ok(build_id)
        }
        .instrument(span)
        .await
    }

    async fn build_state(&self, build_id: &str) -> ProviderResult<BuildState> {
        let span = info_span!("aws.codebuild.batch_get_builds", build.id = build_id);

        async move {
            let output = self
                .client
                .batch_get_builds()
                .ids(build_id)
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to get status of build {build_id}"),
                        e.into_service_error(),
                    )
                })?;

            let build = output
                .builds()
                .first()
                .ok_or_else(|| ProviderError::not_found("Build", build_id))?;

            let status = build
                .build_status()
                .map_or(BuildStatus::InProgress, BuildStatus::from);
            let reached_build_phase = build
                .phases()
                .iter()
                .any(|phase| phase.phase_type() == Some(&BuildPhaseType::Build));

            debug!(
                "Build {} status={:?} reached_build_phase={}",
                build_id, status, reached_build_phase
            );
            Ok(BuildState {
                status,
                reached_build_phase,
            })
        }
        .instrument(span)
        .await
    }

    async fn stop_build(&self, build_id: &str) -> ProviderResult<()> {
        let span = info_span!("aws.codebuild.stop_build", build.id = build_id);

        async move {
            info!("Stopping build {}", build_id);
            self.client
                .stop_build()
                .id(build_id)
                .send()
                .await
                .map_err(|e| {
                    service_error(
                        &format!("Failed to stop build {build_id}"),
                        e.into_service_error(),
                    )
                })?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}
