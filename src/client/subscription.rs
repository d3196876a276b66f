//! Subscriber side of the protocol: one multiplexed bidirectional stream.
//!
//! Control frames (`subscribe`, `unsubscribe`) go out on the request half;
//! acknowledgments, measurements and status changes come back interleaved
//! on the response half. The stream is opened lazily by the first control
//! call and a session never holds more than one of them.

use super::event::SubscriberEvent;
use crate::auth::Token;
use crate::error::{Error, Result};
use crate::proto::sensor_client_service_client::SensorClientServiceClient;
use crate::proto::{SubscribeRequest, SubscriptionResponse};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Request, Streaming};
use tracing::{debug, warn};

const CONTROL_BUFFER: usize = 32;

/// Everything a session reports to its owner, in transport order.
///
/// `stream` is the number of the stream the event belongs to, as counted by
/// [`SubscriptionSession::streams_opened`]. After `close` and a reopen, the
/// old stream's farewell and `Ended` can still arrive after the new stream's
/// `Opened`.
#[derive(Debug)]
pub enum SessionEvent {
    Opened { stream: u64 },
    Event(SubscriberEvent),
    /// The server ended the stream normally.
    Ended { stream: u64 },
    /// The stream failed. The session is closed and may be reopened.
    Failed { stream: u64, error: Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    Reused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closing,
    NotOpen,
}

struct ActiveStream {
    generation: u64,
    control: mpsc::Sender<SubscribeRequest>,
    subscriptions: HashSet<String>,
}

struct Inner {
    client: SensorClientServiceClient<Channel>,
    state: Mutex<Option<ActiveStream>>,
    generations: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Inner {
    /// Drops the stream state if it still belongs to `generation`.
    async fn release(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.as_ref().map(|active| active.generation) == Some(generation) {
            *state = None;
        }
    }
}

/// Handle to a subscriber's stream. Clones share one session.
#[derive(Clone)]
pub struct SubscriptionSession {
    inner: Arc<Inner>,
}

impl SubscriptionSession {
    pub fn new(channel: Channel) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            inner: Arc::new(Inner {
                client: SensorClientServiceClient::new(channel),
                state: Mutex::new(None),
                generations: AtomicU64::new(0),
                events,
            }),
        };
        (session, receiver)
    }

    /// Opens the stream unless one is already open.
    pub async fn open(&self, token: &Token) -> Result<OpenOutcome> {
        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            return Ok(OpenOutcome::Reused);
        }
        *state = Some(self.connect(token).await?);
        Ok(OpenOutcome::Opened)
    }

    pub async fn subscribe(&self, token: &Token, sensor_id: &str) -> Result<OpenOutcome> {
        self.control(token, sensor_id, false).await
    }

    pub async fn unsubscribe(&self, token: &Token, sensor_id: &str) -> Result<OpenOutcome> {
        self.control(token, sensor_id, true).await
    }

    /// Half-closes the stream. Events already in flight, including the
    /// server's farewell, are still delivered and end with
    /// [`SessionEvent::Ended`] for that stream.
    pub async fn close(&self) -> CloseOutcome {
        let mut state = self.inner.state.lock().await;
        match state.take() {
            Some(active) => {
                debug!(
                    subscriptions = active.subscriptions.len(),
                    "Closing subscription stream"
                );
                CloseOutcome::Closing
            }
            None => CloseOutcome::NotOpen,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.inner.state.lock().await.is_some()
    }

    /// Sensors this session has asked for on the current stream, sorted.
    pub async fn subscriptions(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<String> = state
            .as_ref()
            .map(|active| active.subscriptions.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Number of streams this session has opened so far.
    pub fn streams_opened(&self) -> u64 {
        self.inner.generations.load(Ordering::SeqCst)
    }

    async fn control(&self, token: &Token, sensor_id: &str, disconnect: bool) -> Result<OpenOutcome> {
        let mut state = self.inner.state.lock().await;
        let outcome = if state.is_none() {
            *state = Some(self.connect(token).await?);
            OpenOutcome::Opened
        } else {
            OpenOutcome::Reused
        };
        let active = state
            .as_mut()
            .ok_or_else(|| Error::Stream("subscription stream is not open".into()))?;

        active
            .control
            .send(SubscribeRequest {
                sensor_id: sensor_id.to_string(),
                disconnect,
            })
            .await
            .map_err(|_| Error::Stream("subscription stream is closed".into()))?;

        if disconnect {
            active.subscriptions.remove(sensor_id);
        } else {
            active.subscriptions.insert(sensor_id.to_string());
        }
        Ok(outcome)
    }

    /// Opens a new stream and starts dispatching its responses.
    async fn connect(&self, token: &Token) -> Result<ActiveStream> {
        let (control, outgoing) = mpsc::channel(CONTROL_BUFFER);
        let mut request = Request::new(ReceiverStream::new(outgoing));
        token.attach(&mut request)?;

        let mut client = self.inner.client.clone();
        let inbound = client
            .subscribe_on_sensor(request)
            .await
            .map_err(Error::from_stream_status)?
            .into_inner();

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Subscription stream opened");
        let _ = self.inner.events.send(SessionEvent::Opened { stream: generation });
        tokio::spawn(dispatch(self.inner.clone(), generation, inbound));

        Ok(ActiveStream {
            generation,
            control,
            subscriptions: HashSet::new(),
        })
    }
}

async fn dispatch(inner: Arc<Inner>, generation: u64, mut inbound: Streaming<SubscriptionResponse>) {
    let outcome = loop {
        match inbound.message().await {
            Ok(Some(response)) => {
                let event = SubscriberEvent::decode(response);
                if let SubscriberEvent::Unknown(reason) = &event {
                    warn!("Unrecognized subscription message: {}", reason);
                }
                let _ = inner.events.send(SessionEvent::Event(event));
            }
            Ok(None) => {
                debug!(generation, "Subscription stream ended");
                break SessionEvent::Ended { stream: generation };
            }
            Err(status) => {
                warn!(generation, "Subscription stream failed: {}", status);
                break SessionEvent::Failed {
                    stream: generation,
                    error: Error::from_stream_status(status),
                };
            }
        }
    };

    inner.release(generation).await;
    let _ = inner.events.send(outcome);
}
