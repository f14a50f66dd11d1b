//! Metrics collector entry point.

use clap::Parser;
use metrica::cli::{self, ServerCli};
use metrica::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_logging();

    let config = ServerCli::parse().into_config()?;
    metrica::server::run(config).await
}
