//! # Layer Buildspec
//!
//! CodeBuild buildspec that packages an npm project as a Lambda layer and
//! reports the outcome to CloudFormation itself.
//!
//! The buildspec is fixed text. Everything that varies per event reaches the
//! build as a plain-text environment variable override, so property values
//! are never spliced into shell commands.
//!
//! The build phase starts by writing a FAILED response to `response.json`
//! and only flips it to SUCCESS once the layer version is published. The
//! phase's `finally` block PUTs whatever `response.json` holds, so a build
//! that reaches the BUILD phase always calls back exactly once.

use serde::Serialize;
use std::collections::BTreeMap;

/// Presigned CloudFormation response URL
pub const ENV_RESPONSE_URL: &str = "CFN_RESPONSE_URL";
/// FAILED response body the build starts from
pub const ENV_RESPONSE_TEMPLATE: &str = "CFN_RESPONSE";
/// `s3://<bucket>/<key>` of the zipped npm project
pub const ENV_PACKAGE_URI: &str = "PACKAGE_URI";
/// npm arguments, space separated
pub const ENV_NPM_ARGS: &str = "NPM_ARGS";
/// Name the layer version is published under
pub const ENV_LAYER_NAME: &str = "LAYER_NAME";

#[derive(Debug, Serialize)]
struct BuildSpec {
    version: f64,
    phases: Phases,
}

#[derive(Debug, Serialize)]
struct Phases {
    install: Phase,
    build: Phase,
}

#[derive(Debug, Default, Serialize)]
struct Phase {
    #[serde(rename = "runtime-versions", skip_serializing_if = "BTreeMap::is_empty")]
    runtime_versions: BTreeMap<String, String>,
    commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    finally: Vec<String>,
}

/// Inputs of one layer build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBuild {
    pub response_url: String,
    /// Serialized FAILED response for this event
    pub response_template: String,
    pub package_bucket: String,
    pub package_key: String,
    pub npm_args: Vec<String>,
    pub layer_name: String,
}

impl LayerBuild {
    /// Environment variable overrides for the build, in a stable order
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            (ENV_RESPONSE_URL.to_string(), self.response_url.clone()),
            (
                ENV_RESPONSE_TEMPLATE.to_string(),
                self.response_template.clone(),
            ),
            (
                ENV_PACKAGE_URI.to_string(),
                format!("s3://{}/{}", self.package_bucket, self.package_key),
            ),
            (ENV_NPM_ARGS.to_string(), self.npm_args.join(" ")),
            (ENV_LAYER_NAME.to_string(), self.layer_name.clone()),
        ]
    }
}

/// Render the layer buildspec as YAML
///
/// # Errors
///
/// Only fails if YAML serialization itself fails.
pub fn render_buildspec() -> Result<String, serde_yaml::Error> {
    let spec = BuildSpec {
        version: 0.2,
        phases: Phases {
            install: Phase {
                runtime_versions: BTreeMap::from([("nodejs".to_string(), "latest".to_string())]),
                commands: vec!["npm i -g npm".to_string()],
                ..Phase::default()
            },
            build: Phase {
                commands: vec![
                    format!("printenv {ENV_RESPONSE_TEMPLATE} > response.json"),
                    format!("aws s3 cp \"${ENV_PACKAGE_URI}\" package.zip"),
                    "unzip -x package.zip -d nodejs".to_string(),
                    format!("npm ${ENV_NPM_ARGS} --prefix nodejs"),
                    "zip -r code nodejs -x 'nodejs/package*' 'nodejs/*.tgz'".to_string(),
                    format!(
                        "aws lambda publish-layer-version --layer-name \"${ENV_LAYER_NAME}\" \
                         --description \"$(jq -r '.name' nodejs/package.json)\" \
                         --compatible-runtimes nodejs --zip-file fileb://code.zip > result.json"
                    ),
                    "jq --arg arn \"$(jq -r '.LayerVersionArn' result.json)\" \
                     '.Status = \"SUCCESS\" | .PhysicalResourceId = $arn | .Data = {LayerVersionArn: $arn} | del(.Reason)' \
                     response.json > response.next && mv response.next response.json"
                        .to_string(),
                ],
                finally: vec![format!(
                    "curl -sS -X PUT -H 'content-type: application/json' \
                     --data-binary @response.json \"${ENV_RESPONSE_URL}\""
                )],
                ..Phase::default()
            },
        },
    };

    serde_yaml::to_string(&spec)
}
