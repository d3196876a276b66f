//! `SensorService` implementation: registration, measurement ingestion,
//! roster and history queries.

use super::directory::{SensorDirectory, SensorRecord};
use crate::auth::{principal, Principal, TokenIssuer};
use crate::model::Measurement;
use crate::proto::sensor_service_server::SensorService;
use crate::proto::{
    decode_timestamp, MeasurementRequest, SearchTagsRequest, SensorHistoryRequest,
    SensorHistoryResponse, SensorInfoResponse, SensorOnlineStatus, SensorRegistrationRequest,
    SensorRegistrationResponse,
};
use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, trace};
use uuid::Uuid;

type SensorInfoStream = Pin<Box<dyn Stream<Item = Result<SensorInfoResponse, Status>> + Send + 'static>>;

pub struct SensorServiceImpl {
    directory: Arc<SensorDirectory>,
    issuer: Arc<TokenIssuer>,
}

impl SensorServiceImpl {
    pub fn new(directory: Arc<SensorDirectory>, issuer: Arc<TokenIssuer>) -> Self {
        Self { directory, issuer }
    }
}

/// Holds a sensor online for the lifetime of one measurement stream.
///
/// Dropping it without [`OnlineSession::finish`] announces `Unknown`, which
/// covers failed streams and handlers dropped on disconnect.
struct OnlineSession {
    sensor: Arc<SensorRecord>,
    finished: bool,
}

impl OnlineSession {
    fn open(sensor: Arc<SensorRecord>) -> Option<Self> {
        sensor.try_go_online().then_some(Self {
            sensor,
            finished: false,
        })
    }

    fn finish(mut self) {
        self.finished = true;
        self.sensor.go_offline(SensorOnlineStatus::SensorOffline);
    }
}

impl Drop for OnlineSession {
    fn drop(&mut self) {
        if !self.finished {
            self.sensor.go_offline(SensorOnlineStatus::SensorUnknown);
        }
    }
}

#[tonic::async_trait]
impl SensorService for SensorServiceImpl {
    async fn register_sensor(
        &self,
        request: Request<SensorRegistrationRequest>,
    ) -> Result<Response<SensorRegistrationResponse>, Status> {
        let request = request.into_inner();
        if request.name.trim().is_empty() || request.location.trim().is_empty() {
            return Err(Status::invalid_argument("Sensor name and location are required"));
        }

        let id = Uuid::new_v4();
        let token = self.issuer.issue(&Principal::Sensor { id })?;
        if self
            .directory
            .register(id, request.name, request.location, request.tags)
            .is_none()
        {
            info!("Sensor was not registered. Already exists.");
            return Err(Status::already_exists(
                "Sensor with given name and location already exists",
            ));
        }

        info!("Sensor was registered. ID: {}", id);
        Ok(Response::new(SensorRegistrationResponse {
            token: token.as_str().to_string(),
            id: id.to_string(),
        }))
    }

    async fn send_measurements(
        &self,
        request: Request<Streaming<MeasurementRequest>>,
    ) -> Result<Response<()>, Status> {
        let sensor_id = match principal(&request)? {
            Principal::Sensor { id } => id,
            Principal::Client { .. } => {
                return Err(Status::permission_denied("Token does not belong to a sensor"))
            }
        };

        let session = self
            .directory
            .get(&sensor_id)
            .and_then(OnlineSession::open)
            .ok_or_else(|| {
                info!(%sensor_id, "Sensor does not exist or is already connected");
                Status::not_found(
                    "Token you specified has no sensor associated with it. Or this sensor is already connected",
                )
            })?;
        debug!(%sensor_id, "Sensor started streaming");

        let mut inbound = request.into_inner();
        loop {
            match inbound.message().await {
                Ok(Some(published)) => {
                    let made_at = published
                        .made_at
                        .as_ref()
                        .and_then(decode_timestamp)
                        .unwrap_or_else(|| {
                            debug!(%sensor_id, "Measurement without a valid timestamp, using receipt time");
                            Utc::now()
                        });
                    trace!(%sensor_id, value = published.value, "Sensor published measurement");
                    session.sensor.record(Measurement {
                        sensor_id: sensor_id.to_string(),
                        value: published.value,
                        made_at,
                    });
                }
                Ok(None) => {
                    debug!(%sensor_id, "Sensor data transmission is over");
                    session.finish();
                    return Ok(Response::new(()));
                }
                Err(status) => {
                    error!(%sensor_id, "Sensor stream failed: {}", status);
                    drop(session);
                    return Err(Status::unknown("Sensor sent an error"));
                }
            }
        }
    }

    type GetSensorsStream = SensorInfoStream;

    async fn get_sensors(
        &self,
        request: Request<SearchTagsRequest>,
    ) -> Result<Response<Self::GetSensorsStream>, Status> {
        let tags = request.into_inner().tags;
        let roster: Vec<SensorInfoResponse> = self
            .directory
            .find_by_tags(&tags)
            .iter()
            .map(|sensor| sensor.to_info())
            .collect();
        debug!(count = roster.len(), "Listing sensors");

        Ok(Response::new(Box::pin(tokio_stream::iter(
            roster.into_iter().map(Ok),
        ))))
    }

    async fn get_history_for_sensor(
        &self,
        request: Request<SensorHistoryRequest>,
    ) -> Result<Response<SensorHistoryResponse>, Status> {
        let request = request.into_inner();
        if request.depth <= 0 {
            return Err(Status::invalid_argument("Depth must be greater than 0"));
        }
        let sensor_id = Uuid::parse_str(&request.sensor_id)
            .map_err(|_| Status::invalid_argument("Sensor id is not a valid UUID"))?;
        let sensor = self
            .directory
            .get(&sensor_id)
            .ok_or_else(|| Status::not_found("Sensor with given id does not exist"))?;

        let measurements = sensor
            .latest(request.depth as usize)
            .iter()
            .map(Measurement::to_response)
            .collect();

        Ok(Response::new(SensorHistoryResponse {
            measurements,
            sensor_status: sensor.status() as i32,
        }))
    }
}
