//! Reference in-memory server for the `sensors` contract.
//!
//! Registration, roster and history live in process memory; measurement
//! fan-out runs over per-sensor broadcast channels. Nothing is persisted.

pub mod client_service;
pub mod clients;
pub mod directory;
pub mod history;
pub mod sensor_service;

pub use client_service::ClientServiceImpl;
pub use clients::ClientRegistry;
pub use directory::{SensorDirectory, SensorRecord};
pub use sensor_service::SensorServiceImpl;

use crate::auth::{AuthInterceptor, TokenIssuer};
use crate::config::Settings;
use crate::error::Result;
use crate::proto::sensor_client_service_server::SensorClientServiceServer;
use crate::proto::sensor_service_server::SensorServiceServer;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;

/// Shared server state: both services see the same sensors and tokens.
#[derive(Clone)]
pub struct SensorServer {
    directory: Arc<SensorDirectory>,
    clients: Arc<ClientRegistry>,
    issuer: Arc<TokenIssuer>,
    event_buffer: usize,
}

impl SensorServer {
    pub fn new(settings: &Settings) -> Result<Self> {
        let issuer = TokenIssuer::from_hex_secret(settings.auth.secret.as_deref())?;
        Ok(Self::with_issuer(
            Arc::new(issuer),
            settings.server.history_capacity,
            settings.server.event_buffer,
        ))
    }

    pub fn with_issuer(issuer: Arc<TokenIssuer>, history_capacity: usize, event_buffer: usize) -> Self {
        Self {
            directory: Arc::new(SensorDirectory::new(history_capacity, event_buffer)),
            clients: Arc::new(ClientRegistry::new()),
            issuer,
            event_buffer,
        }
    }

    pub fn directory(&self) -> &Arc<SensorDirectory> {
        &self.directory
    }

    /// Both services behind the token interceptor.
    pub fn router(&self) -> Router {
        let interceptor = AuthInterceptor::new(self.issuer.clone());
        let sensors = SensorServiceImpl::new(self.directory.clone(), self.issuer.clone());
        let clients = ClientServiceImpl::new(
            self.clients.clone(),
            self.directory.clone(),
            self.issuer.clone(),
            self.event_buffer,
        );

        Server::builder()
            .add_service(SensorServiceServer::with_interceptor(sensors, interceptor.clone()))
            .add_service(SensorClientServiceServer::with_interceptor(clients, interceptor))
    }

    /// Serves on `addr` until `shutdown` resolves.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Starting server on {}", addr);
        self.router().serve_with_shutdown(addr, shutdown).await?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Serves on an already bound listener, used with ephemeral ports.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let incoming = TcpListenerStream::new(listener);
        self.router().serve_with_incoming(incoming).await?;
        Ok(())
    }
}
