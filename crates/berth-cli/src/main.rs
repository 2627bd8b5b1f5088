//! berth CLI
//!
//! Runs container images as long-lived cluster services and routes to them.

use clap::Parser;

use berth_cli::{Cli, Result};
use berth_common::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;
    cli.run().await
}
