//! Roster and history queries.

use super::event::decode_measurement;
use crate::error::{Error, Result};
use crate::model::Measurement;
use crate::proto::sensor_service_client::SensorServiceClient;
use crate::proto::{SearchTagsRequest, SensorHistoryRequest, SensorInfoResponse, SensorOnlineStatus};
use futures::stream::{BoxStream, StreamExt};
use serde::{Serialize, Serializer};
use tonic::transport::Channel;

/// One roster entry as the server reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub id: String,
    pub name: String,
    pub location: String,
    pub tags: Vec<String>,
    #[serde(serialize_with = "serialize_status")]
    pub online_status: SensorOnlineStatus,
}

impl From<SensorInfoResponse> for SensorSummary {
    fn from(info: SensorInfoResponse) -> Self {
        Self {
            online_status: SensorOnlineStatus::resolve(info.online_status),
            id: info.id,
            name: info.name,
            location: info.location,
            tags: info.tags,
        }
    }
}

fn serialize_status<S: Serializer>(
    status: &SensorOnlineStatus,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(status.display_name())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorHistory {
    /// Newest first.
    pub measurements: Vec<Measurement>,
    pub status: SensorOnlineStatus,
}

#[derive(Clone)]
pub struct Directory {
    client: SensorServiceClient<Channel>,
}

impl Directory {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: SensorServiceClient::new(channel),
        }
    }

    /// Every registered sensor. The returned stream yields one entry per
    /// sensor and ends once the server has sent the whole roster.
    pub async fn list_sensors(&self) -> Result<BoxStream<'static, Result<SensorSummary>>> {
        self.find_by_tags(Vec::new()).await
    }

    /// Sensors carrying at least one of `tags`; an empty list matches all.
    pub async fn find_by_tags(
        &self,
        tags: Vec<String>,
    ) -> Result<BoxStream<'static, Result<SensorSummary>>> {
        let mut client = self.client.clone();
        let roster = client
            .get_sensors(SearchTagsRequest { tags })
            .await
            .map_err(Error::from_query_status)?
            .into_inner();

        Ok(roster
            .map(|entry| {
                entry
                    .map(SensorSummary::from)
                    .map_err(Error::from_stream_status)
            })
            .boxed())
    }

    pub async fn sensor_history(&self, sensor_id: &str, depth: i32) -> Result<SensorHistory> {
        if depth <= 0 {
            return Err(Error::Usage("Depth must be greater than 0".into()));
        }
        let mut client = self.client.clone();
        let response = client
            .get_history_for_sensor(SensorHistoryRequest {
                sensor_id: sensor_id.to_string(),
                depth,
            })
            .await
            .map_err(Error::from_query_status)?
            .into_inner();

        let measurements = response
            .measurements
            .into_iter()
            .map(decode_measurement)
            .collect::<Result<Vec<_>>>()?;
        Ok(SensorHistory {
            measurements,
            status: SensorOnlineStatus::resolve(response.sensor_status),
        })
    }
}
