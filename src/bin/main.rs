//! sensorstream binary.
//!
//! Runs the reference server or one of the interactive peers.

use anyhow::{Context, Result};
use clap::Parser;
use sensorstream_core::{
    cli::commands::Commands,
    cli::handlers::{init_logging, run_sensor, run_server, run_subscriber},
    config::{ConfigArgs, Settings},
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).context("Failed to load configuration")?;

    let log_dir = match &cli.command {
        Commands::Server(cmd) => cmd.log_dir.clone(),
        _ => None,
    };
    let _guard = init_logging(&settings.logging, log_dir.as_deref())?;

    info!("sensorstream starting up");

    match cli.command {
        Commands::Server(cmd) => run_server(cmd, settings).await,
        Commands::Sensor(cmd) => run_sensor(cmd, settings).await,
        Commands::Subscriber(cmd) => run_subscriber(cmd, settings).await,
    }
}
