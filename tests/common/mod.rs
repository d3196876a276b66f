#![allow(dead_code)]

use sensorstream_core::auth::TokenIssuer;
use sensorstream_core::client::{
    connect, AuthHandshake, ClientIdentity, ClientRegistration, SensorIdentity,
    SensorRegistration, SessionEvent, StreamNotice, SubscriberEvent,
};
use sensorstream_core::server::SensorServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tonic::transport::Channel;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub endpoint: String,
    pub server: SensorServer,
}

impl TestServer {
    pub async fn channel(&self) -> Channel {
        connect(&self.endpoint).await.unwrap()
    }
}

/// Starts a reference server on an ephemeral port.
pub async fn start_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint = format!("http://127.0.0.1:{}", addr.port());

    let issuer = Arc::new(TokenIssuer::new(b"integration-test-secret"));
    let server = SensorServer::with_issuer(issuer, 10, 64);

    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve_with_listener(listener).await.unwrap();
    });

    TestServer { endpoint, server }
}

pub async fn register_sensor(channel: &Channel, name: &str) -> SensorIdentity {
    AuthHandshake::new(channel.clone())
        .register_sensor(SensorRegistration {
            name: name.to_string(),
            location: "lab".to_string(),
            tags: vec!["indoor".to_string()],
        })
        .await
        .unwrap()
}

pub async fn register_client(channel: &Channel, login: &str) -> ClientIdentity {
    AuthHandshake::new(channel.clone())
        .register_client(ClientRegistration {
            login: login.to_string(),
            password: "secret".to_string(),
            email: format!("{}@example.com", login),
        })
        .await
        .unwrap()
}

/// Waits for the first session event matching `pred`, skipping the others.
pub async fn wait_for_session<F>(
    events: &mut UnboundedReceiver<SessionEvent>,
    mut pred: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = events.recv().await.expect("session event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Waits for the first subscriber event matching `pred`.
pub async fn wait_for_event<F>(
    events: &mut UnboundedReceiver<SessionEvent>,
    mut pred: F,
) -> SubscriberEvent
where
    F: FnMut(&SubscriberEvent) -> bool,
{
    match wait_for_session(events, |event| matches!(event, SessionEvent::Event(e) if pred(e)))
        .await
    {
        SessionEvent::Event(event) => event,
        other => panic!("unexpected session event: {other:?}"),
    }
}

pub async fn wait_for_notice<F>(
    notices: &mut UnboundedReceiver<StreamNotice>,
    mut pred: F,
) -> StreamNotice
where
    F: FnMut(&StreamNotice) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let notice = notices.recv().await.expect("notice channel closed");
            if pred(&notice) {
                return notice;
            }
        }
    })
    .await
    .expect("timed out waiting for stream notice")
}
