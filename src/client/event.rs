use crate::error::{Error, Result};
use crate::model::Measurement;
use crate::proto::{
    decode_timestamp, subscription_response, ActionSuccessStatus, MeasurementResponse,
    SensorOnlineStatus, SubscriptionResponse,
};
use std::fmt;

/// One server-to-subscriber event. Exactly one variant per inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    /// Acknowledgment of a control frame. Not correlated to a request.
    ActionResult {
        status: ActionSuccessStatus,
        message: String,
    },
    Measurement(Measurement),
    OnlineStatusChange {
        sensor_id: String,
        status: SensorOnlineStatus,
    },
    /// None of the known variants could be read; the stream stays open.
    Unknown(String),
}

impl SubscriberEvent {
    pub fn decode(response: SubscriptionResponse) -> Self {
        match response.response {
            Some(subscription_response::Response::ActionResult(result)) => {
                SubscriberEvent::ActionResult {
                    status: ActionSuccessStatus::try_from(result.action_status)
                        .unwrap_or(ActionSuccessStatus::InvalidRequest),
                    message: result.message,
                }
            }
            Some(subscription_response::Response::Measurement(measurement)) => {
                match decode_measurement(measurement) {
                    Ok(measurement) => SubscriberEvent::Measurement(measurement),
                    Err(e) => SubscriberEvent::Unknown(e.to_string()),
                }
            }
            Some(subscription_response::Response::OnlineStatusChange(change)) => {
                SubscriberEvent::OnlineStatusChange {
                    status: SensorOnlineStatus::resolve(change.online_status),
                    sensor_id: change.sensor_id,
                }
            }
            None => SubscriberEvent::Unknown("no event variant populated".into()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SubscriberEvent::Unknown(_))
    }
}

/// Reads a wire measurement; the `{seconds, nanos}` pair must be present and valid.
pub fn decode_measurement(response: MeasurementResponse) -> Result<Measurement> {
    let made_at = response
        .made_at
        .as_ref()
        .and_then(decode_timestamp)
        .ok_or_else(|| Error::Protocol("measurement without a valid timestamp".into()))?;
    Ok(Measurement {
        sensor_id: response.sensor_id,
        value: response.value,
        made_at,
    })
}

impl fmt::Display for SubscriberEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberEvent::ActionResult { message, .. } => f.write_str(message),
            SubscriberEvent::Measurement(m) => write!(
                f,
                "Measurement received.\n    From: {}\n    Value: {}\n    Made at: {}",
                m.sensor_id,
                m.value,
                m.made_at.to_rfc3339()
            ),
            SubscriberEvent::OnlineStatusChange { sensor_id, status } => write!(
                f,
                "Sensor's online status changed. Id: {} - {}",
                sensor_id,
                status.display_name()
            ),
            SubscriberEvent::Unknown(_) => f.write_str("Unknown format of message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ActionResult, OnlineStatusChange};
    use prost_types::Timestamp;

    #[test]
    fn test_decode_measurement_event() {
        let event = SubscriberEvent::decode(SubscriptionResponse {
            response: Some(subscription_response::Response::Measurement(MeasurementResponse {
                sensor_id: "s-1".into(),
                value: 0.42,
                made_at: Some(Timestamp {
                    seconds: 1_700_000_000,
                    nanos: 0,
                }),
            })),
        });

        let SubscriberEvent::Measurement(measurement) = &event else {
            panic!("unexpected event: {event:?}");
        };
        assert_eq!(measurement.made_at.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(
            event.to_string(),
            "Measurement received.\n    From: s-1\n    Value: 0.42\n    Made at: 2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_decode_status_change() {
        let event = SubscriberEvent::decode(SubscriptionResponse {
            response: Some(subscription_response::Response::OnlineStatusChange(
                OnlineStatusChange {
                    sensor_id: "s-2".into(),
                    online_status: SensorOnlineStatus::SensorOffline as i32,
                },
            )),
        });
        assert_eq!(event.to_string(), "Sensor's online status changed. Id: s-2 - Offline");
    }

    #[test]
    fn test_decode_action_result() {
        let event = SubscriberEvent::decode(SubscriptionResponse {
            response: Some(subscription_response::Response::ActionResult(ActionResult {
                action_status: ActionSuccessStatus::SubscriptionSuccess as i32,
                message: "You are now subscribed on sensor: s-3".into(),
            })),
        });
        assert_eq!(
            event,
            SubscriberEvent::ActionResult {
                status: ActionSuccessStatus::SubscriptionSuccess,
                message: "You are now subscribed on sensor: s-3".into(),
            }
        );
    }

    #[test]
    fn test_empty_response_is_unknown() {
        let event = SubscriberEvent::decode(SubscriptionResponse { response: None });
        assert!(event.is_unknown());
        assert_eq!(event.to_string(), "Unknown format of message");
    }

    #[test]
    fn test_measurement_without_timestamp_is_unknown() {
        let event = SubscriberEvent::decode(SubscriptionResponse {
            response: Some(subscription_response::Response::Measurement(MeasurementResponse {
                sensor_id: "s-4".into(),
                value: 1.0,
                made_at: None,
            })),
        });
        assert!(event.is_unknown());
    }
}
