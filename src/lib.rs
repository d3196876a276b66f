//! Sensor telemetry over gRPC.
//!
//! A sensor registers, authenticates and streams measurements; a subscriber
//! authenticates, lists sensors and multiplexes subscriptions over a single
//! bidirectional stream. [`client`] holds both peers' protocol core and
//! [`server`] an in-memory reference server for the same contract.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod proto;
pub mod server;

pub use auth::{Principal, Token, TokenIssuer};
pub use client::{
    AuthHandshake, Directory, MeasurementStream, SessionEvent, StreamNotice, SubscriberEvent,
    SubscriptionSession,
};
pub use config::{ConfigArgs, Settings};
pub use error::{Error, Result};
pub use model::Measurement;
pub use server::SensorServer;
