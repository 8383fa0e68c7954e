//! BlueGuard threat alert service - main entry point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&settings.logging)?;

    info!("=== BlueGuard Threat Alerts v{} ===", env!("CARGO_PKG_VERSION"));
    run_server(settings).await
}
