//! Domain types shared by the peers and the reference server.

use crate::proto::{self, subscription_response, SensorOnlineStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One reading taken by a sensor. Immutable once sent; downstream it is only
/// relayed or dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub sensor_id: String,
    pub value: f64,
    pub made_at: DateTime<Utc>,
}

impl Measurement {
    pub fn to_response(&self) -> proto::MeasurementResponse {
        proto::MeasurementResponse {
            sensor_id: self.sensor_id.clone(),
            value: self.value,
            made_at: Some(proto::encode_timestamp(self.made_at)),
        }
    }
}

/// What a sensor publishes to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Measurement(Measurement),
    StatusChanged {
        sensor_id: String,
        status: SensorOnlineStatus,
    },
}

impl SensorEvent {
    pub fn into_response(self) -> proto::SubscriptionResponse {
        let response = match self {
            SensorEvent::Measurement(measurement) => {
                subscription_response::Response::Measurement(measurement.to_response())
            }
            SensorEvent::StatusChanged { sensor_id, status } => {
                subscription_response::Response::OnlineStatusChange(proto::OnlineStatusChange {
                    sensor_id,
                    online_status: status as i32,
                })
            }
        };
        proto::SubscriptionResponse {
            response: Some(response),
        }
    }
}

/// Builds the acknowledgment frame for a control request.
pub fn action_result(
    status: proto::ActionSuccessStatus,
    message: impl Into<String>,
) -> proto::SubscriptionResponse {
    proto::SubscriptionResponse {
        response: Some(subscription_response::Response::ActionResult(
            proto::ActionResult {
                action_status: status as i32,
                message: message.into(),
            },
        )),
    }
}
