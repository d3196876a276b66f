//! Generated gRPC contract for the `sensors` package plus the small
//! conversions that belong to the wire format itself.

#![allow(clippy::enum_variant_names)]

tonic::include_proto!("sensors");

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

/// Metadata key carrying the bearer token on every stream.
pub const AUTHORIZATION_KEY: &str = "authorization";

impl SensorOnlineStatus {
    /// Symbolic name shown to users.
    pub fn display_name(self) -> &'static str {
        match self {
            SensorOnlineStatus::SensorUnknown => "Unknown",
            SensorOnlineStatus::SensorOffline => "Offline",
            SensorOnlineStatus::SensorOnline => "Online",
        }
    }

    /// Resolves a raw enumerant, falling back to `SensorUnknown` for values
    /// this build does not know.
    pub fn resolve(value: i32) -> Self {
        SensorOnlineStatus::try_from(value).unwrap_or(SensorOnlineStatus::SensorUnknown)
    }
}

/// Encodes an instant as a protobuf timestamp.
pub fn encode_timestamp(instant: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: instant.timestamp(),
        nanos: instant.timestamp_subsec_nanos() as i32,
    }
}

/// Decodes a `{seconds, nanos}` pair into an absolute instant.
///
/// Nanos are kept as the sub-second remainder. Returns `None` when the pair
/// is outside the representable range or nanos are negative.
pub fn decode_timestamp(timestamp: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(timestamp.nanos).ok()?;
    DateTime::from_timestamp(timestamp.seconds, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_instant() {
        let decoded = decode_timestamp(&Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        })
        .unwrap();
        assert_eq!(decoded.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(decoded.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_decode_keeps_subsecond_remainder() {
        let decoded = decode_timestamp(&Timestamp {
            seconds: 1_700_000_000,
            nanos: 250_000_000,
        })
        .unwrap();
        assert_eq!(decoded.timestamp_millis(), 1_700_000_000_250);
    }

    #[test]
    fn test_decode_rejects_negative_nanos() {
        assert!(decode_timestamp(&Timestamp {
            seconds: 1,
            nanos: -5
        })
        .is_none());
    }

    #[test]
    fn test_online_status_names() {
        assert_eq!(SensorOnlineStatus::resolve(2).display_name(), "Online");
        assert_eq!(SensorOnlineStatus::resolve(1).display_name(), "Offline");
        assert_eq!(SensorOnlineStatus::resolve(42).display_name(), "Unknown");
    }

    #[test]
    fn test_encode_decode_now() {
        let now = Utc::now();
        assert_eq!(decode_timestamp(&encode_timestamp(now)), Some(now));
    }
}
