use crate::cli::commands::{SensorCommand, ServerCommand, SubscriberCommand};
use crate::cli::repl::{
    parse_sensor_line, parse_subscriber_line, SensorLine, SubscriberLine, SENSOR_USAGE,
    SUBSCRIBER_USAGE,
};
use crate::{
    auth::Token,
    client::{
        connect, AuthHandshake, ClientIdentity, ClientRegistration, CloseOutcome, Directory,
        EndOutcome, MeasurementStream, RandomSource, SensorIdentity, SensorRegistration,
        SensorSummary, SessionEvent, StartOutcome, StreamNotice, SubscriptionSession,
    },
    config::{LoggingSettings, Settings},
    model::Measurement,
    server::SensorServer,
};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Logs go to stderr so they do not mix
/// with peer output; with `log_dir` they are also written to a daily file.
///
/// The returned guard flushes the file writer and must be kept alive.
pub fn init_logging(logging: &LoggingSettings, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            logging
                .level
                .parse::<LevelFilter>()
                .unwrap_or(LevelFilter::INFO)
                .into(),
        )
        .parse_lossy(logging.filter.as_deref().unwrap_or(""));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "sensorstream.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_thread_names(true)
                        .compact(),
                )
                .try_init()
                .context("Failed to initialize logging")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("Failed to initialize logging")?;
            Ok(None)
        }
    }
}

pub async fn run_server(command: ServerCommand, mut settings: Settings) -> Result<()> {
    if let Some(host) = command.host {
        settings.server.host = host;
    }
    if let Some(port) = command.port {
        settings.server.port = port;
    }

    let addr = settings
        .server
        .listen_addr()
        .context("Invalid listen address")?;
    let server = SensorServer::new(&settings).context("Failed to create server")?;

    server
        .serve(addr, shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested");
}

pub async fn run_sensor(command: SensorCommand, settings: Settings) -> Result<()> {
    let channel = connect(&settings.client.endpoint)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.client.endpoint))?;
    let handshake = AuthHandshake::new(channel.clone());
    let (stream, mut notices) = MeasurementStream::new(channel);
    let default_period = command
        .period_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.client.measurement_period());

    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                StreamNotice::Opened => debug!("Measurement stream opened"),
                StreamNotice::Closed => println!("Sensor >>> Streaming is over"),
                StreamNotice::Errored(e) => println!("Sensor >>> Streaming stopped: {}", e),
            }
        }
    });

    println!("{}", SENSOR_USAGE);
    let mut identity: Option<SensorIdentity> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = match parse_sensor_line(&line) {
            Ok(line) => line,
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        match line {
            SensorLine::Empty => {}
            SensorLine::Register {
                name,
                location,
                tags,
            } => {
                let registration = SensorRegistration {
                    name,
                    location,
                    tags,
                };
                match handshake.register_sensor(registration).await {
                    Ok(registered) => {
                        println!("Sensor >>> Sensor was registered. Id: {}", registered.id);
                        identity = Some(registered);
                    }
                    Err(e) => println!("Sensor >>> {}", e),
                }
            }
            SensorLine::WhoAmI => match &identity {
                Some(sensor) => println!(
                    "Sensor >>> Id: {} Name: {} Location: {} Tags: [{}]",
                    sensor.id,
                    sensor.name,
                    sensor.location,
                    sensor.tags.join(", ")
                ),
                None => println!("Sensor >>> Not registered"),
            },
            SensorLine::StartStream { period, token } => {
                let token = token
                    .map(Token::new)
                    .or_else(|| identity.as_ref().map(|sensor| sensor.token.clone()));
                let Some(token) = token else {
                    println!("Sensor >>> Register first or pass a token");
                    continue;
                };

                match stream.start(&token) {
                    Ok(StartOutcome::Started) => {
                        let period = period.unwrap_or(default_period);
                        match stream.attach_emitter(period, RandomSource::new()) {
                            Ok(()) => println!("Sensor >>> Streaming random data has started"),
                            Err(e) => println!("Sensor >>> {}", e),
                        }
                    }
                    Ok(StartOutcome::AlreadyStreaming) => {
                        println!("Sensor >>> Stream is already opened")
                    }
                    Err(e) => println!("Sensor >>> {}", e),
                }
            }
            SensorLine::EndStream => match stream.end() {
                EndOutcome::Ending => println!("Sensor >>> Ending stream"),
                EndOutcome::NoStream => println!("Sensor >>> No stream is opened"),
            },
            SensorLine::Quit => break,
        }
    }

    stream.end();
    Ok(())
}

fn print_summary(summary: &SensorSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary).context("Failed to render sensor")?);
    } else {
        println!(
            "Client >>> Id: {} Name: {} Location: {} Tags: [{}] Status: {}",
            summary.id,
            summary.name,
            summary.location,
            summary.tags.join(", "),
            summary.online_status.display_name()
        );
    }
    Ok(())
}

fn print_measurement(measurement: &Measurement, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(measurement).context("Failed to render measurement")?
        );
    } else {
        println!(
            "Client >>> Value: {} Made at: {}",
            measurement.value,
            measurement.made_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn run_subscriber(command: SubscriberCommand, settings: Settings) -> Result<()> {
    let channel = connect(&settings.client.endpoint)
        .await
        .with_context(|| format!("Failed to connect to {}", settings.client.endpoint))?;
    let handshake = AuthHandshake::new(channel.clone());
    let directory = Directory::new(channel.clone());
    let (session, mut events) = SubscriptionSession::new(channel);

    let printer = session.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Opened { stream } => debug!(stream, "Subscription stream opened"),
                SessionEvent::Event(event) => println!("Client >>> {}", event),
                SessionEvent::Ended { stream } if stream < printer.streams_opened() => {
                    debug!(stream, "Previous subscription stream is over")
                }
                SessionEvent::Ended { .. } => println!("Client >>> Subscription stream is over"),
                SessionEvent::Failed { error, .. } => {
                    println!("Client >>> Subscription stream failed: {}", error)
                }
            }
        }
    });

    println!("{}", SUBSCRIBER_USAGE);
    let mut identity: Option<ClientIdentity> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = match parse_subscriber_line(&line) {
            Ok(line) => line,
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        match line {
            SubscriberLine::Empty => {}
            SubscriberLine::Register {
                login,
                password,
                email,
            } => {
                let registration = ClientRegistration {
                    login,
                    password,
                    email,
                };
                match handshake.register_client(registration).await {
                    Ok(client) => {
                        println!("Client >>> Registered as {}", client.login);
                        identity = Some(client);
                    }
                    Err(e) => println!("Client >>> {}", e),
                }
            }
            SubscriberLine::Login { login, password } => {
                match handshake.login(&login, &password).await {
                    Ok(client) => {
                        println!("Client >>> Logged in as {}", client.login);
                        identity = Some(client);
                    }
                    Err(e) => println!("Client >>> {}", e),
                }
            }
            SubscriberLine::List => match directory.list_sensors().await {
                Ok(mut roster) => {
                    while let Some(entry) = roster.next().await {
                        match entry {
                            Ok(summary) => print_summary(&summary, command.json)?,
                            Err(e) => {
                                println!("Client >>> {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => println!("Client >>> {}", e),
            },
            SubscriberLine::History { sensor_id, depth } => {
                match directory.sensor_history(&sensor_id, depth).await {
                    Ok(history) => {
                        println!("Client >>> Sensor status: {}", history.status.display_name());
                        for measurement in history.measurements {
                            print_measurement(&measurement, command.json)?;
                        }
                    }
                    Err(e) => println!("Client >>> {}", e),
                }
            }
            SubscriberLine::SubscribeOn(sensor_id) | SubscriberLine::UnsubscribeFrom(sensor_id)
                if identity.is_none() =>
            {
                debug!(%sensor_id, "Control request without a token");
                println!("Client >>> Log in or register first");
            }
            SubscriberLine::SubscribeOn(sensor_id) => {
                if let Some(client) = &identity {
                    if let Err(e) = session.subscribe(&client.token, &sensor_id).await {
                        println!("Client >>> {}", e);
                    }
                }
            }
            SubscriberLine::UnsubscribeFrom(sensor_id) => {
                if let Some(client) = &identity {
                    if let Err(e) = session.unsubscribe(&client.token, &sensor_id).await {
                        println!("Client >>> {}", e);
                    }
                }
            }
            SubscriberLine::Disconnect => {
                if session.close().await == CloseOutcome::NotOpen {
                    println!("Client >>> No stream is opened");
                }
            }
            SubscriberLine::Quit => break,
        }
    }

    session.close().await;
    Ok(())
}
