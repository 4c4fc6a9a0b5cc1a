//! # CRHCTL CLI
//!
//! Operator tool for the custom resource handlers.
//!
//! ## Usage
//!
//! ```bash
//! # Run a handler locally against real AWS, delivering the callback as usual
//! crhctl invoke --event create-keypair.json
//!
//! # Same, but print the response instead of PUTting it
//! crhctl invoke --kind cognito-user --event event.json --print-only
//!
//! # Show the buildspec used for Node.js layer builds
//! crhctl buildspec
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use custom_resource_handlers::cfn::{
    CallbackError, HttpResponseReporter, ReconciliationResult, ResponseReporter,
};
use custom_resource_handlers::config::HandlerConfig;
use custom_resource_handlers::dispatcher::Dispatcher;
use custom_resource_handlers::observability::init_tracing;
use custom_resource_handlers::provider::aws::load_sdk_config;
use custom_resource_handlers::reconciler::nodejs_layer::buildspec::render_buildspec;
use custom_resource_handlers::runtime::{build_handler, ResourceKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Custom resource handlers CLI
#[derive(Parser)]
#[command(name = "crhctl")]
#[command(
    about = "CloudFormation custom resource handlers CLI",
    long_about = None,
    after_help = "\
Available kinds:
  keypair            - Custom::KeyPair
  cloudfront-keypair - Custom::CloudFrontKeyPair
  cognito-user       - Custom::CognitoUserPoolUser
  nodejs-layer       - Custom::NodejsLayerVersion

Examples:
  crhctl invoke --event create.json --print-only
  crhctl buildspec
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one lifecycle event through a handler
    Invoke {
        /// Handler to run; defaults to the event's ResourceType
        #[arg(short, long, value_enum)]
        kind: Option<ResourceKind>,

        /// File holding the lifecycle event JSON
        #[arg(short, long, value_name = "FILE")]
        event: PathBuf,

        /// Print the response instead of sending it to the ResponseURL
        #[arg(long)]
        print_only: bool,
    },
    /// Print the CodeBuild buildspec used for Node.js layers
    Buildspec,
}

/// Reporter that prints the response instead of delivering it
struct StdoutReporter;

#[async_trait]
impl ResponseReporter for StdoutReporter {
    async fn report(
        &self,
        _response_url: &str,
        result: &ReconciliationResult,
    ) -> Result<(), CallbackError> {
        println!("{}", serde_json::to_string_pretty(result)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Invoke {
            kind,
            event,
            print_only,
        } => invoke(kind, &event, print_only).await,
        Commands::Buildspec => {
            print!("{}", render_buildspec().context("Failed to render the buildspec")?);
            Ok(())
        }
    }
}

async fn invoke(kind: Option<ResourceKind>, event_path: &Path, print_only: bool) -> Result<()> {
    let config = HandlerConfig::from_env();
    init_tracing(&HandlerConfig {
        log_format: "text".to_string(),
        ..config.clone()
    })?;

    let raw = std::fs::read_to_string(event_path)
        .with_context(|| format!("Failed to read {}", event_path.display()))?;
    let payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", event_path.display()))?;

    let kind = match kind {
        Some(kind) => kind,
        None => {
            let resource_type = payload
                .get("ResourceType")
                .and_then(Value::as_str)
                .context("Event has no ResourceType; pass --kind")?;
            let Some(kind) = ResourceKind::from_resource_type(resource_type) else {
                bail!("No handler for resource type {resource_type}; pass --kind");
            };
            kind
        }
    };

    let sdk_config = load_sdk_config(config.aws_region.as_deref()).await;
    let handler = build_handler(kind, &config, &sdk_config);
    let reporter: Arc<dyn ResponseReporter> = if print_only {
        Arc::new(StdoutReporter)
    } else {
        Arc::new(HttpResponseReporter::new(config.callback_timeout())?)
    };

    match Dispatcher::new(handler, reporter).dispatch(payload).await? {
        Some(result) if !print_only => {
            println!(
                "Delivered {} for {} ({})",
                result.status.as_str(),
                result.logical_resource_id,
                result.physical_resource_id
            );
        }
        Some(_) => {}
        None => println!("Callback handed off to the remote build"),
    }
    Ok(())
}
