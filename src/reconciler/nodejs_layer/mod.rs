//! # Node.js Layer Reconciler
//!
//! `Custom::NodejsLayerVersion`: a Lambda layer version built from a zipped
//! npm project by a CodeBuild project (`BUILDER_NAME`).
//!
//! Packaging can outlast the function's own time limit, so the build job
//! delivers the callback itself (see [`buildspec`]). The handler starts the
//! build and watches it only to catch builds that die before the job could
//! report:
//!
//! | Build state                             | Who reports            |
//! |-----------------------------------------|------------------------|
//! | `SUCCEEDED`                             | build job (SUCCESS)    |
//! | failed after entering the BUILD phase   | build job (FAILED)     |
//! | failed before the BUILD phase           | dispatcher (FAILED)    |
//! | still running at the wait timeout       | build job              |
//!
//! Physical id: the layer version ARN.

pub mod buildspec;

use self::buildspec::{render_buildspec, LayerBuild};
use super::{parse_properties, required};
use crate::cfn::{CreateRequest, DeleteRequest, EventContext, ReconciliationResult, UpdateRequest};
use crate::config::HandlerConfig;
use crate::constants::CREATE_FAILED_MARKER;
use crate::dispatcher::{CustomResourceHandler, HandlerResponse, Outcome};
use crate::error::{HandlerError, HandlerResult};
use crate::provider::{
    BuildRequest, BuildService, BuildState, BuildStatus, IgnoreNotFound, LayerRegistry,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const RESOURCE_TYPE: &str = "Custom::NodejsLayerVersion";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PackageProperties {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodejsLayerProperties {
    #[serde(default)]
    package: Option<PackageProperties>,
    #[serde(default)]
    npm_args: Option<Vec<String>>,
    #[serde(default, deserialize_with = "crate::cfn::values::flag")]
    delete_layer: bool,
}

/// Validated layer properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodejsLayerSpec {
    pub package_bucket: String,
    pub package_key: String,
    pub npm_args: Vec<String>,
    pub delete_layer: bool,
}

impl NodejsLayerSpec {
    /// # Errors
    ///
    /// Returns [`HandlerError::Validation`] naming the first missing property.
    pub fn from_properties(properties: &Value) -> HandlerResult<Self> {
        let props: NodejsLayerProperties = parse_properties(properties)?;

        let package = props
            .package
            .ok_or_else(|| HandlerError::validation("Package must be specified"))?;
        let package_bucket = required(package.bucket, "Package.Bucket")?;
        let package_key = required(package.key, "Package.Key")?;
        let npm_args = props
            .npm_args
            .filter(|args| !args.is_empty())
            .ok_or_else(|| HandlerError::validation("NpmArgs must be specified"))?;

        Ok(Self {
            package_bucket,
            package_key,
            npm_args,
            delete_layer: props.delete_layer,
        })
    }

    /// Whether a rebuild would produce the same layer
    #[must_use]
    pub fn same_build_inputs(&self, other: &Self) -> bool {
        self.package_bucket == other.package_bucket
            && self.package_key == other.package_key
            && self.npm_args == other.npm_args
    }
}

/// Layer name and version parsed from a layer version ARN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerVersionRef {
    pub layer_name: String,
    pub version_number: i64,
}

impl LayerVersionRef {
    /// Parse `arn:<partition>:lambda:<region>:<account>:layer:<name>:<version>`
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MalformedPhysicalId`] for anything else.
    pub fn parse(arn: &str) -> HandlerResult<Self> {
        let malformed = || HandlerError::MalformedPhysicalId(arn.to_string());

        let parts: Vec<&str> = arn.split(':').collect();
        let [prefix, _, service, _, _, kind, layer_name, version] = parts.as_slice() else {
            return Err(malformed());
        };
        if *prefix != "arn" || *service != "lambda" || *kind != "layer" || layer_name.is_empty() {
            return Err(malformed());
        }
        let version_number = version.parse::<i64>().map_err(|_e| malformed())?;

        Ok(Self {
            layer_name: (*layer_name).to_string(),
            version_number,
        })
    }
}

/// Build settings taken from the handler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBuildSettings {
    pub builder_name: Option<String>,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl LayerBuildSettings {
    #[must_use]
    pub fn from_config(config: &HandlerConfig) -> Self {
        Self {
            builder_name: config.builder_name.clone(),
            poll_interval: config.build_poll_interval(),
            wait_timeout: config.build_wait_timeout(),
        }
    }
}

/// Reconciler for `Custom::NodejsLayerVersion`
#[derive(Clone)]
pub struct NodejsLayerHandler {
    builds: Arc<dyn BuildService>,
    layers: Arc<dyn LayerRegistry>,
    settings: LayerBuildSettings,
}

impl std::fmt::Debug for NodejsLayerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodejsLayerHandler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl NodejsLayerHandler {
    pub fn new(
        builds: Arc<dyn BuildService>,
        layers: Arc<dyn LayerRegistry>,
        settings: LayerBuildSettings,
    ) -> Self {
        Self {
            builds,
            layers,
            settings,
        }
    }

    /// Start the layer build and watch it until it can be left alone
    ///
    /// `failure_id` is the physical id the build reports if it fails.
    async fn build_layer(
        &self,
        context: &EventContext,
        spec: &NodejsLayerSpec,
        layer_name: &str,
        failure_id: &str,
    ) -> HandlerResult<Outcome> {
        let builder_name = self.settings.builder_name.clone().ok_or_else(|| {
            anyhow!("The environment variable BUILDER_NAME must be specified")
        })?;

        let template = ReconciliationResult::failed(
            context,
            failure_id,
            &format!("Building layer {layer_name} failed, see the CodeBuild logs of {builder_name}"),
        );
        let build = LayerBuild {
            response_url: context.response_url.clone(),
            response_template: serde_json::to_string(&template)
                .context("Failed to serialize the response template")?,
            package_bucket: spec.package_bucket.clone(),
            package_key: spec.package_key.clone(),
            npm_args: spec.npm_args.clone(),
            layer_name: layer_name.to_string(),
        };

        let request = BuildRequest {
            project_name: builder_name,
            buildspec: render_buildspec().context("Failed to render the layer buildspec")?,
            environment: build.environment(),
        };

        let build_id = self.builds.start_build(&request).await?;
        info!("Started build {} for layer {}", build_id, layer_name);

        self.watch_build(&build_id).await
    }

    /// Stop waiting on a build that is still running at the deadline
    ///
    /// Once in its BUILD phase the build sends the callback itself. Before
    /// that it may still die without reporting, so it is stopped and the
    /// failure reported here.
    async fn abandon_build(&self, build_id: &str, state: &BuildState) -> HandlerResult<Outcome> {
        if state.reached_build_phase {
            warn!(
                "Build {} still running after {:?}, leaving the callback to it",
                build_id, self.settings.wait_timeout
            );
            return Ok(Outcome::Deferred);
        }

        if let Err(e) = self.builds.stop_build(build_id).await {
            warn!("Failed to stop build {}: {}", build_id, e);
        }
        Err(HandlerError::Internal(anyhow!(
            "Build {build_id} did not reach its BUILD phase within {}s",
            self.settings.wait_timeout.as_secs()
        )))
    }

    /// Poll the build until it is terminal or the wait timeout passes
    async fn watch_build(&self, build_id: &str) -> HandlerResult<Outcome> {
        let deadline = Instant::now() + self.settings.wait_timeout;

        loop {
            let state = self.builds.build_state(build_id).await?;

            match state.status {
                BuildStatus::Succeeded => {
                    info!("Build {} succeeded, the build reported the new layer version", build_id);
                    return Ok(Outcome::Deferred);
                }
                BuildStatus::InProgress => {
                    if Instant::now() >= deadline {
                        return self.abandon_build(build_id, &state).await;
                    }
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                status if state.reached_build_phase => {
                    warn!("Build {} ended with {:?}, the build reported FAILED", build_id, status);
                    return Ok(Outcome::Deferred);
                }
                status => {
                    return Err(HandlerError::Internal(anyhow!(
                        "Build {build_id} ended with {status:?} before reaching its BUILD phase"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl CustomResourceHandler for NodejsLayerHandler {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, request: &CreateRequest) -> HandlerResult<Outcome> {
        let spec = NodejsLayerSpec::from_properties(&request.resource_properties)?;

        let stack_name = request.context.stack_name().ok_or_else(|| {
            HandlerError::MalformedEvent(format!(
                "Cannot derive a stack name from {}",
                request.context.stack_id
            ))
        })?;
        let layer_name = format!("{stack_name}-{}", request.context.logical_resource_id);

        self.build_layer(&request.context, &spec, &layer_name, CREATE_FAILED_MARKER)
            .await
    }

    async fn update(&self, request: &UpdateRequest) -> HandlerResult<Outcome> {
        let spec = NodejsLayerSpec::from_properties(&request.resource_properties)?;
        let layer = LayerVersionRef::parse(&request.physical_resource_id)?;

        let unchanged = NodejsLayerSpec::from_properties(&request.old_resource_properties)
            .is_ok_and(|old| old.same_build_inputs(&spec));
        if unchanged {
            return Ok(HandlerResponse::new(request.physical_resource_id.clone())
                .with_data("LayerVersionArn", request.physical_resource_id.as_str())
                .with_reason(format!(
                    "The lambda layer {} has not been modified",
                    layer.layer_name
                ))
                .into());
        }

        self.build_layer(
            &request.context,
            &spec,
            &layer.layer_name,
            &request.physical_resource_id,
        )
        .await
    }

    async fn delete(&self, request: &DeleteRequest) -> HandlerResult<Outcome> {
        let props: NodejsLayerProperties =
            parse_properties(&request.resource_properties).unwrap_or_default();

        if props.delete_layer {
            let layer = LayerVersionRef::parse(&request.physical_resource_id)?;
            if self
                .layers
                .delete_layer_version(&layer.layer_name, layer.version_number)
                .await
                .ignore_not_found()?
            {
                info!(
                    "Deleted layer {} version {}",
                    layer.layer_name, layer.version_number
                );
            }
        } else {
            info!("Retaining layer version {}", request.physical_resource_id);
        }

        Ok(HandlerResponse::new(request.physical_resource_id.clone())
            .with_reason(format!(
                "The lambda layer {} has been deleted",
                request.physical_resource_id
            ))
            .into())
    }
}
