//! Metrics agent entry point.

use clap::Parser;
use metrica::agent::Agent;
use metrica::cli::{self, AgentCli};
use metrica::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_logging();

    let config = AgentCli::parse().into_config()?;
    let agent = Agent::new(config)?;
    agent.run().await
}
