//! Lambda bootstrap for `Custom::KeyPair`

use custom_resource_handlers::runtime::{run_lambda, ResourceKind};

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    run_lambda(ResourceKind::Keypair).await
}
