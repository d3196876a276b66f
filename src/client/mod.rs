//! Client-side protocol core shared by the sensor and subscriber peers.

pub mod directory;
pub mod event;
pub mod handshake;
pub mod measurement;
pub mod source;
pub mod subscription;

pub use directory::{Directory, SensorHistory, SensorSummary};
pub use event::SubscriberEvent;
pub use handshake::{
    AuthHandshake, ClientIdentity, ClientRegistration, SensorIdentity, SensorRegistration,
};
pub use measurement::{EndOutcome, MeasurementStream, StartOutcome, StreamNotice};
pub use source::{MeasurementSource, RandomSource};
pub use subscription::{CloseOutcome, OpenOutcome, SessionEvent, SubscriptionSession};

use crate::error::Result;
use tonic::transport::{Channel, Endpoint};

/// Connects a channel to `endpoint`, e.g. `http://127.0.0.1:8090`.
pub async fn connect(endpoint: &str) -> Result<Channel> {
    let channel = Endpoint::from_shared(endpoint.to_string())?
        .connect()
        .await?;
    Ok(channel)
}
