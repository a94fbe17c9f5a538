//! Command line browser for BigQuery metadata.
//!
//! Loads `configuration/` (or `--config-dir`) the same way services do, opens a metadata
//! connection through the process-wide cache and prints the requested listing as JSON lines.

use clap::Parser;
use tracing::error;

use crate::args::AppArgs;
use crate::core::run;

mod args;
mod core;

#[tokio::main]
async fn main() {
    if let Err(err) = main_impl().await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn main_impl() -> anyhow::Result<()> {
    bqmeta_telemetry::tracing::init_tracing(env!("CARGO_BIN_NAME"))?;

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install default crypto provider"))?;

    let args = AppArgs::parse();
    run(args).await
}
