//! One-shot registration and login.
//!
//! Each call is a single unary request. A failure carries the server's
//! detail string and is never retried here; the caller decides whether to
//! make a new attempt.

use crate::auth::Token;
use crate::error::{Error, Result};
use crate::proto::sensor_client_service_client::SensorClientServiceClient;
use crate::proto::sensor_service_client::SensorServiceClient;
use crate::proto::{ClientLoginRequest, ClientRegistrationRequest, SensorRegistrationRequest};
use tonic::transport::Channel;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SensorRegistration {
    pub name: String,
    pub location: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub login: String,
    pub password: String,
    pub email: String,
}

/// A registered sensor. Immutable for the session.
#[derive(Debug, Clone)]
pub struct SensorIdentity {
    pub id: String,
    pub name: String,
    pub location: String,
    pub tags: Vec<String>,
    pub token: Token,
}

/// An authenticated subscriber. `email` is only known after registration.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub login: String,
    pub email: Option<String>,
    pub token: Token,
}

#[derive(Clone)]
pub struct AuthHandshake {
    sensors: SensorServiceClient<Channel>,
    clients: SensorClientServiceClient<Channel>,
}

impl AuthHandshake {
    pub fn new(channel: Channel) -> Self {
        Self {
            sensors: SensorServiceClient::new(channel.clone()),
            clients: SensorClientServiceClient::new(channel),
        }
    }

    pub async fn register_sensor(&self, registration: SensorRegistration) -> Result<SensorIdentity> {
        let mut sensors = self.sensors.clone();
        let response = sensors
            .register_sensor(SensorRegistrationRequest {
                name: registration.name.clone(),
                location: registration.location.clone(),
                tags: registration.tags.clone(),
            })
            .await
            .map_err(Error::from_auth_status)?
            .into_inner();

        if response.token.is_empty() || response.id.is_empty() {
            return Err(Error::Protocol("registration response without token or id".into()));
        }
        debug!(id = %response.id, "Sensor registered");

        Ok(SensorIdentity {
            id: response.id,
            name: registration.name,
            location: registration.location,
            tags: registration.tags,
            token: Token::new(response.token),
        })
    }

    pub async fn register_client(&self, registration: ClientRegistration) -> Result<ClientIdentity> {
        let mut clients = self.clients.clone();
        let response = clients
            .register_client(ClientRegistrationRequest {
                login: registration.login.clone(),
                password: registration.password,
                email: registration.email.clone(),
            })
            .await
            .map_err(Error::from_auth_status)?
            .into_inner();
        debug!(login = %registration.login, "Client registered");

        Ok(ClientIdentity {
            login: registration.login,
            email: Some(registration.email),
            token: Token::new(response.token),
        })
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<ClientIdentity> {
        let mut clients = self.clients.clone();
        let response = clients
            .login_client(ClientLoginRequest {
                login: login.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(Error::from_auth_status)?
            .into_inner();

        Ok(ClientIdentity {
            login: login.to_string(),
            email: None,
            token: Token::new(response.token),
        })
    }
}
