mod common;

use chrono::{DateTime, Utc};
use common::{
    register_client, register_sensor, start_test_server, wait_for_event, wait_for_notice,
    wait_for_session,
};
use futures::Stream;
use sensorstream_core::client::{
    connect, CloseOutcome, MeasurementStream, OpenOutcome, SessionEvent, StreamNotice,
    SubscriberEvent, SubscriptionSession,
};
use sensorstream_core::proto::sensor_client_service_server::{
    SensorClientService, SensorClientServiceServer,
};
use sensorstream_core::proto::{
    ActionSuccessStatus, ClientLoginRequest, ClientRegistrationRequest, SensorOnlineStatus,
    SubscribeRequest, SubscriptionResponse, TokenResponse,
};
use sensorstream_core::{Error, Token};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

fn is_action(event: &SubscriberEvent, expected: ActionSuccessStatus) -> bool {
    matches!(event, SubscriberEvent::ActionResult { status, .. } if *status == expected)
}

#[tokio::test]
async fn test_control_calls_share_one_stream() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let first = register_sensor(&channel, "temp-1").await;
    let second = register_sensor(&channel, "temp-2").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel);

    assert!(!session.is_open().await);
    assert_eq!(
        session.subscribe(&client.token, &first.id).await.unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(
        session.subscribe(&client.token, &second.id).await.unwrap(),
        OpenOutcome::Reused
    );
    assert_eq!(
        session.unsubscribe(&client.token, &first.id).await.unwrap(),
        OpenOutcome::Reused
    );
    assert_eq!(session.open(&client.token).await.unwrap(), OpenOutcome::Reused);

    assert_eq!(session.streams_opened(), 1);
    assert_eq!(session.subscriptions().await, vec![second.id.clone()]);

    let ack = wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::SubscriptionSuccess)
    })
    .await;
    assert_eq!(
        ack.to_string(),
        format!("You are now subscribed on sensor: {}", first.id)
    );
    let ack = wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::UnsubscriptionSuccess)
    })
    .await;
    assert_eq!(
        ack.to_string(),
        format!("You have unsubscribed from sensor: {}", first.id)
    );
}

#[tokio::test]
async fn test_measurements_and_status_changes_reach_subscriber() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel.clone());

    session.subscribe(&client.token, &sensor.id).await.unwrap();
    wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::SubscriptionSuccess)
    })
    .await;

    let (stream, mut notices) = MeasurementStream::new(channel);
    stream.start(&sensor.token).unwrap();
    let made_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    stream.push(0.42, made_at).unwrap();

    let online = wait_for_event(&mut events, |e| {
        matches!(e, SubscriberEvent::OnlineStatusChange { .. })
    })
    .await;
    assert_eq!(
        online,
        SubscriberEvent::OnlineStatusChange {
            sensor_id: sensor.id.clone(),
            status: SensorOnlineStatus::SensorOnline,
        }
    );

    let measurement =
        wait_for_event(&mut events, |e| matches!(e, SubscriberEvent::Measurement(_))).await;
    let SubscriberEvent::Measurement(measurement) = measurement else {
        unreachable!()
    };
    assert_eq!(measurement.sensor_id, sensor.id);
    assert_eq!(measurement.value, 0.42);
    assert_eq!(measurement.made_at.to_rfc3339(), "2023-11-14T22:13:20+00:00");

    stream.end();
    wait_for_notice(&mut notices, |n| matches!(n, StreamNotice::Closed)).await;
    let offline = wait_for_event(&mut events, |e| {
        matches!(e, SubscriberEvent::OnlineStatusChange { .. })
    })
    .await;
    assert_eq!(
        offline.to_string(),
        format!("Sensor's online status changed. Id: {} - Offline", sensor.id)
    );
}

#[tokio::test]
async fn test_unsubscribe_stops_measurements() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel.clone());

    session.subscribe(&client.token, &sensor.id).await.unwrap();
    session.unsubscribe(&client.token, &sensor.id).await.unwrap();
    wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::UnsubscriptionSuccess)
    })
    .await;
    assert!(session.subscriptions().await.is_empty());

    let (stream, _notices) = MeasurementStream::new(channel);
    stream.start(&sensor.token).unwrap();
    stream.push(0.5, chrono::Utc::now()).unwrap();

    let received = tokio::time::timeout(Duration::from_millis(300), async {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Event(SubscriberEvent::Measurement(_))) {
                return true;
            }
        }
        false
    })
    .await;
    assert!(!matches!(received, Ok(true)));
    stream.end();
}

#[tokio::test]
async fn test_control_frames_for_unknown_sensors() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel);

    session.subscribe(&client.token, "no-such-sensor").await.unwrap();
    let result = wait_for_event(&mut events, |e| {
        matches!(e, SubscriberEvent::ActionResult { .. })
    })
    .await;
    assert_eq!(
        result,
        SubscriberEvent::ActionResult {
            status: ActionSuccessStatus::InvalidRequest,
            message: "Sensor you specified does not exist".into(),
        }
    );

    session.unsubscribe(&client.token, &sensor.id).await.unwrap();
    let result = wait_for_event(&mut events, |e| {
        matches!(e, SubscriberEvent::ActionResult { .. })
    })
    .await;
    assert_eq!(result.to_string(), "Client is not subscribed");

    session.subscribe(&client.token, &sensor.id).await.unwrap();
    session.subscribe(&client.token, &sensor.id).await.unwrap();
    wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::SubscriptionSuccess)
    })
    .await;
    let duplicate = wait_for_event(&mut events, |e| {
        matches!(e, SubscriberEvent::ActionResult { .. })
    })
    .await;
    assert!(is_action(&duplicate, ActionSuccessStatus::SubscriptionFailure));
    assert_eq!(session.subscriptions().await.len(), 2);
}

#[tokio::test]
async fn test_close_is_idempotent_and_reopens() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel);

    assert_eq!(session.close().await, CloseOutcome::NotOpen);

    assert_eq!(session.open(&client.token).await.unwrap(), OpenOutcome::Opened);
    assert_eq!(session.close().await, CloseOutcome::Closing);
    assert_eq!(session.close().await, CloseOutcome::NotOpen);
    assert!(!session.is_open().await);

    let goodbye = wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::DisconnectOk)
    })
    .await;
    assert_eq!(goodbye.to_string(), "Goodbye");
    wait_for_session(&mut events, |e| matches!(e, SessionEvent::Ended { stream: 1 })).await;

    assert_eq!(
        session.subscribe(&client.token, &sensor.id).await.unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(session.streams_opened(), 2);
    assert_eq!(session.subscriptions().await, vec![sensor.id]);
}

#[tokio::test]
async fn test_invalid_token_does_not_open_stream() {
    let server = start_test_server().await;
    let (session, _events) = SubscriptionSession::new(server.channel().await);

    let err = session
        .subscribe(&Token::new("not-a-token"), "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert!(!session.is_open().await);
    assert_eq!(session.streams_opened(), 0);
    assert!(session.subscriptions().await.is_empty());
}

#[tokio::test]
async fn test_previous_stream_end_is_tagged_after_reopen() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel);

    assert_eq!(
        session.subscribe(&client.token, &sensor.id).await.unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(session.close().await, CloseOutcome::Closing);
    assert_eq!(
        session.subscribe(&client.token, &sensor.id).await.unwrap(),
        OpenOutcome::Opened
    );

    let ended = wait_for_session(&mut events, |e| matches!(e, SessionEvent::Ended { .. })).await;
    assert!(matches!(ended, SessionEvent::Ended { stream: 1 }));
    assert_eq!(session.streams_opened(), 2);
    assert!(session.is_open().await);
    assert_eq!(session.subscriptions().await, vec![sensor.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_measurement_after_unsubscribe_ack() {
    let server = start_test_server().await;
    let channel = server.channel().await;
    let sensor = register_sensor(&channel, "temp-1").await;
    let client = register_client(&channel, "alice").await;
    let (session, mut events) = SubscriptionSession::new(channel.clone());

    session.subscribe(&client.token, &sensor.id).await.unwrap();
    wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::SubscriptionSuccess)
    })
    .await;

    let (stream, _notices) = MeasurementStream::new(channel);
    stream.start(&sensor.token).unwrap();
    for i in 0..40 {
        stream.push(i as f64, Utc::now()).unwrap();
    }
    wait_for_event(&mut events, |e| matches!(e, SubscriberEvent::Measurement(_))).await;

    session.unsubscribe(&client.token, &sensor.id).await.unwrap();
    wait_for_event(&mut events, |e| {
        is_action(e, ActionSuccessStatus::UnsubscriptionSuccess)
    })
    .await;

    let leaked = tokio::time::timeout(Duration::from_millis(300), async {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Event(SubscriberEvent::Measurement(_))) {
                return true;
            }
        }
        false
    })
    .await;
    assert!(!matches!(leaked, Ok(true)));
    stream.end();
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<SubscriptionResponse, Status>> + Send>>;

/// Answers its first stream with an empty frame and then an error; later
/// streams stay open.
#[derive(Default)]
struct BreaksFirstStream {
    streams: AtomicUsize,
}

#[tonic::async_trait]
impl SensorClientService for BreaksFirstStream {
    async fn register_client(
        &self,
        _request: Request<ClientRegistrationRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        Err(Status::unimplemented("register_client"))
    }

    async fn login_client(
        &self,
        _request: Request<ClientLoginRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        Err(Status::unimplemented("login_client"))
    }

    type SubscribeOnSensorStream = ResponseStream;

    async fn subscribe_on_sensor(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> Result<Response<Self::SubscribeOnSensorStream>, Status> {
        let mut inbound = request.into_inner();
        tokio::spawn(async move { while let Ok(Some(_)) = inbound.message().await {} });

        if self.streams.fetch_add(1, Ordering::SeqCst) == 0 {
            let frames = vec![
                Ok(SubscriptionResponse { response: None }),
                Err(Status::internal("stream broke")),
            ];
            let broken: ResponseStream = Box::pin(tokio_stream::iter(frames));
            Ok(Response::new(broken))
        } else {
            let open: ResponseStream = Box::pin(futures::stream::pending());
            Ok(Response::new(open))
        }
    }
}

#[tokio::test]
async fn test_stream_error_closes_session_and_allows_reopen() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        Server::builder()
            .add_service(SensorClientServiceServer::new(BreaksFirstStream::default()))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let channel = connect(&endpoint).await.unwrap();
    let (session, mut events) = SubscriptionSession::new(channel);
    let token = Token::new("any-token");

    assert_eq!(session.open(&token).await.unwrap(), OpenOutcome::Opened);

    let first = wait_for_session(&mut events, |e| !matches!(e, SessionEvent::Opened { .. })).await;
    assert!(matches!(
        first,
        SessionEvent::Event(SubscriberEvent::Unknown(_))
    ));
    match wait_for_session(&mut events, |_| true).await {
        SessionEvent::Failed {
            stream,
            error: Error::Stream(details),
        } => {
            assert_eq!(stream, 1);
            assert!(details.contains("stream broke"));
        }
        other => panic!("unexpected session event: {other:?}"),
    }
    assert!(!session.is_open().await);

    assert_eq!(
        session.subscribe(&token, "sensor-1").await.unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(session.streams_opened(), 2);
    assert!(session.is_open().await);
    assert_eq!(session.subscriptions().await, vec!["sensor-1".to_string()]);
}
