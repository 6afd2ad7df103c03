//! Command implementations

mod analyze;
mod config;
mod import;
mod resolve;
mod simulate;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use faixa_core::config::LayeredConfig;

/// Execute a CLI command
pub async fn execute(cli: Cli, output: &OutputWriter) -> Result<()> {
    let config = LayeredConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(storage = ?cli.storage, config_file = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Import(args) => import::execute(args, cli.storage, config, output).await,
        Commands::Resolve(args) => resolve::execute(args, output),
        Commands::Analyze(args) => analyze::execute(args, config, output),
        Commands::Simulate(args) => simulate::execute(args, cli.storage, config, output).await,
        Commands::Config => config::execute(&config, output),
    }
}
