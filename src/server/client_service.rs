//! `SensorClientService` implementation: subscriber accounts and the
//! multiplexed subscription stream.

use super::clients::ClientRegistry;
use super::directory::SensorDirectory;
use crate::auth::{principal, Principal, TokenIssuer};
use crate::model::{action_result, SensorEvent};
use crate::proto::sensor_client_service_server::SensorClientService;
use crate::proto::{
    ActionSuccessStatus, ClientLoginRequest, ClientRegistrationRequest, SubscribeRequest,
    SubscriptionResponse, TokenResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Outbound = mpsc::Sender<Result<SubscriptionResponse, Status>>;

/// The outbound half of a subscription stream was dropped.
#[derive(Debug)]
struct SubscriberGone;

pub struct ClientServiceImpl {
    clients: Arc<ClientRegistry>,
    directory: Arc<SensorDirectory>,
    issuer: Arc<TokenIssuer>,
    outbound_buffer: usize,
}

impl ClientServiceImpl {
    pub fn new(
        clients: Arc<ClientRegistry>,
        directory: Arc<SensorDirectory>,
        issuer: Arc<TokenIssuer>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            clients,
            directory,
            issuer,
            outbound_buffer,
        }
    }

    fn token_for(&self, login: &str) -> Result<Response<TokenResponse>, Status> {
        let token = self.issuer.issue(&Principal::Client {
            login: login.to_string(),
        })?;
        Ok(Response::new(TokenResponse {
            token: token.as_str().to_string(),
        }))
    }
}

#[tonic::async_trait]
impl SensorClientService for ClientServiceImpl {
    async fn register_client(
        &self,
        request: Request<ClientRegistrationRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        let request = request.into_inner();
        if request.login.is_empty() || request.password.is_empty() || request.email.is_empty() {
            return Err(Status::invalid_argument("Login, password and email are required"));
        }
        if !self
            .clients
            .register(&request.login, &request.password, &request.email)
        {
            debug!("Client was not registered. Already exists.");
            return Err(Status::already_exists(
                "Client with given login or email already exists",
            ));
        }

        debug!("Client with login {} was registered", request.login);
        self.token_for(&request.login)
    }

    async fn login_client(
        &self,
        request: Request<ClientLoginRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        let request = request.into_inner();
        if !self.clients.verify(&request.login, &request.password) {
            info!("Wrong credentials were given");
            return Err(Status::unauthenticated(
                "Client with given credentials does not exist",
            ));
        }
        self.token_for(&request.login)
    }

    type SubscribeOnSensorStream = ReceiverStream<Result<SubscriptionResponse, Status>>;

    async fn subscribe_on_sensor(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> Result<Response<Self::SubscribeOnSensorStream>, Status> {
        let login = match principal(&request)? {
            Principal::Client { login } => login,
            Principal::Sensor { .. } => {
                return Err(Status::permission_denied("Token does not belong to a client"))
            }
        };
        if !self.clients.contains(&login) {
            return Err(Status::unauthenticated("Wrong token provided"));
        }

        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let session = SubscriberSession {
            login,
            directory: self.directory.clone(),
            outbound: tx,
            forwarders: HashMap::new(),
        };
        tokio::spawn(session.run(request.into_inner()));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Server side of one multiplexed subscription stream.
///
/// Owns one forwarding task per subscribed sensor; all of them, plus the
/// action results, write into the same outbound channel.
struct SubscriberSession {
    login: String,
    directory: Arc<SensorDirectory>,
    outbound: Outbound,
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

impl SubscriberSession {
    async fn run(mut self, mut inbound: Streaming<SubscribeRequest>) {
        debug!(login = %self.login, "Subscription stream opened");
        let watcher = self.outbound.clone();

        loop {
            tokio::select! {
                message = inbound.message() => match message {
                    Ok(Some(request)) => {
                        if self.handle(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(login = %self.login, "Client wants to disconnect. Releasing subscriptions");
                        self.clear();
                        let _ = self
                            .outbound
                            .send(Ok(action_result(ActionSuccessStatus::DisconnectOk, "Goodbye")))
                            .await;
                        break;
                    }
                    Err(status) => {
                        debug!(login = %self.login, "Error from client side received: {}", status);
                        self.clear();
                        let _ = self
                            .outbound
                            .send(Err(Status::unknown("Error on client side detected")))
                            .await;
                        break;
                    }
                },
                _ = watcher.closed() => {
                    debug!(login = %self.login, "Subscriber went away");
                    break;
                }
            }
        }

        self.clear();
    }

    /// Applies one control frame and acknowledges it. Fails only when the
    /// subscriber is gone.
    async fn handle(&mut self, request: SubscribeRequest) -> Result<(), SubscriberGone> {
        let sensor = Uuid::parse_str(&request.sensor_id)
            .ok()
            .and_then(|id| self.directory.get(&id));
        let Some(sensor) = sensor else {
            return self
                .acknowledge(
                    ActionSuccessStatus::InvalidRequest,
                    "Sensor you specified does not exist",
                )
                .await;
        };
        let sensor_id = sensor.id();

        if request.disconnect {
            return match self.forwarders.remove(&sensor_id) {
                Some(forwarder) => {
                    // Wait for the abort so nothing is forwarded after the acknowledgment.
                    forwarder.abort();
                    let _ = forwarder.await;
                    self.acknowledge(
                        ActionSuccessStatus::UnsubscriptionSuccess,
                        format!("You have unsubscribed from sensor: {}", sensor_id),
                    )
                    .await
                }
                None => {
                    info!(login = %self.login, "Client is not subscribed to perform this operation");
                    self.acknowledge(ActionSuccessStatus::InvalidRequest, "Client is not subscribed")
                        .await
                }
            };
        }

        if self.forwarders.contains_key(&sensor_id) {
            return self
                .acknowledge(
                    ActionSuccessStatus::SubscriptionFailure,
                    format!("You are already subscribed: {}", sensor_id),
                )
                .await;
        }

        // Subscribe before acknowledging so nothing published after the
        // acknowledgment is missed, then start forwarding after it.
        let events = sensor.subscribe();
        self.acknowledge(
            ActionSuccessStatus::SubscriptionSuccess,
            format!("You are now subscribed on sensor: {}", sensor_id),
        )
        .await?;
        let forwarder = tokio::spawn(forward(sensor_id, events, self.outbound.clone()));
        self.forwarders.insert(sensor_id, forwarder);
        Ok(())
    }

    async fn acknowledge(
        &self,
        status: ActionSuccessStatus,
        message: impl Into<String>,
    ) -> Result<(), SubscriberGone> {
        self.outbound
            .send(Ok(action_result(status, message)))
            .await
            .map_err(|_| SubscriberGone)
    }

    fn clear(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
    }
}

async fn forward(
    sensor_id: Uuid,
    mut events: broadcast::Receiver<SensorEvent>,
    outbound: Outbound,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if outbound.send(Ok(event.into_response())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%sensor_id, skipped, "Subscriber is lagging, events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
