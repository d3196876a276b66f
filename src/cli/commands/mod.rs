pub mod peer;
pub mod server;

pub use peer::{SensorCommand, SubscriberCommand};
pub use server::ServerCommand;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Start the in-memory reference server
    Server(ServerCommand),
    /// Run an interactive sensor that streams measurements
    Sensor(SensorCommand),
    /// Run an interactive subscriber
    Subscriber(SubscriberCommand),
}
