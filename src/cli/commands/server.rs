use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ServerCommand {
    /// Listen host, overrides `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port, overrides `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}
