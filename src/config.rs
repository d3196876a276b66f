//! Configuration management for sensorstream.
//!
//! Settings are layered from these sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/sensorstream/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `SENSORSTREAM_`, `__` between section and key)
//! 5. Command-line arguments
//!
//! Later sources override earlier ones.
//!
//! # Environment Variables
//!
//! - `SENSORSTREAM_SERVER__PORT` - Listen port of the reference server
//! - `SENSORSTREAM_AUTH__SECRET` - Hex encoded token signing secret
//! - `SENSORSTREAM_CLIENT__ENDPOINT` - Server endpoint used by the peers

use crate::error::{Error, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Server endpoint for the peers (e.g. http://127.0.0.1:8090)
    #[arg(long, global = true, env = "SENSORSTREAM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub client: ClientSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Reference server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Measurements kept per sensor for history queries
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Per-sensor broadcast buffer; slower subscribers skip what overflows
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Hex encoded HS256 secret. Generated at startup when absent.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Settings for the sensor and subscriber peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub endpoint: String,
    #[serde(default = "default_measurement_period_ms")]
    pub measurement_period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Full `EnvFilter` directive, overrides `level` when set
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: None,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/sensorstream/config.toml").required(false));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SENSORSTREAM")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Some(endpoint) = &args.endpoint {
            settings.client.endpoint = endpoint.clone();
        }
        if let Some(level) = &args.log_level {
            settings.logging.level = level.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.server.history_capacity == 0 {
            return Err(Error::Config("server.history_capacity must be greater than 0".into()));
        }
        if self.server.event_buffer == 0 {
            return Err(Error::Config("server.event_buffer must be greater than 0".into()));
        }
        if self.client.measurement_period_ms == 0 {
            return Err(Error::Config(
                "client.measurement_period_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl ServerSettings {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))
    }
}

impl ClientSettings {
    pub fn measurement_period(&self) -> Duration {
        Duration::from_millis(self.measurement_period_ms)
    }
}

fn default_history_capacity() -> usize {
    50
}

fn default_event_buffer() -> usize {
    256
}

fn default_measurement_period_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}
