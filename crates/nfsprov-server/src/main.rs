#![warn(missing_docs)]

//! nfsprov provisioner service and admin CLI

use anyhow::Result;
use clap::Parser;
use nfsprov_server::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("nfs-provisioner starting...");

    let cli = Cli::parse();
    cli.run().await
}
