use clap::Args;

#[derive(Args)]
pub struct SensorCommand {
    /// Emission period in milliseconds, overrides `client.measurement_period_ms`
    #[arg(long, value_name = "MS")]
    pub period_ms: Option<u64>,
}

#[derive(Args)]
pub struct SubscriberCommand {
    /// Print the roster and sensor history as JSON lines instead of text
    #[arg(long)]
    pub json: bool,
}
