//! Sensor side of the protocol: one client-to-server measurement stream.
//!
//! The streaming flag is owned by the stream lifecycle. `start` opens the
//! call and marks the session as streaming; only the task that drives the
//! call resets it, once the server has answered or the transport failed.
//! `end` half-closes and leaves the flag alone until that answer arrives.

use super::source::MeasurementSource;
use crate::auth::Token;
use crate::error::{Error, Result};
use crate::proto::sensor_service_client::SensorServiceClient;
use crate::proto::{encode_timestamp, MeasurementRequest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::{debug, trace, warn};

const RECORD_BUFFER: usize = 64;

/// Lifecycle notifications of a measurement stream, in order.
#[derive(Debug)]
pub enum StreamNotice {
    Opened,
    /// The server acknowledged the end of the stream.
    Closed,
    /// The call failed; the session is idle again.
    Errored(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyStreaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// Half-close sent, `Closed` or `Errored` follows.
    Ending,
    NoStream,
}

enum StreamState {
    Idle,
    Streaming {
        generation: u64,
        /// Taken on `end`; nothing is sent once it is gone.
        records: Option<mpsc::Sender<MeasurementRequest>>,
        emitter: Option<JoinHandle<()>>,
    },
}

struct Inner {
    client: SensorServiceClient<Channel>,
    state: Mutex<StreamState>,
    generations: AtomicU64,
    notices: mpsc::UnboundedSender<StreamNotice>,
}

impl Inner {
    fn push(&self, value: f64, made_at: DateTime<Utc>) -> Result<()> {
        let state = self.state.lock();
        let StreamState::Streaming {
            records: Some(records),
            ..
        } = &*state
        else {
            return Err(Error::Usage("No stream is opened".into()));
        };

        records
            .try_send(MeasurementRequest {
                value,
                made_at: Some(encode_timestamp(made_at)),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::Stream("measurement buffer is full".into()),
                TrySendError::Closed(_) => Error::Stream("measurement stream is closed".into()),
            })
    }

    fn finish(&self, generation: u64, result: std::result::Result<Response<()>, Status>) {
        {
            let mut state = self.state.lock();
            let current = matches!(
                &*state,
                StreamState::Streaming { generation: g, .. } if *g == generation
            );
            if current {
                if let StreamState::Streaming {
                    emitter: Some(emitter),
                    ..
                } = std::mem::replace(&mut *state, StreamState::Idle)
                {
                    emitter.abort();
                }
            }
        }

        let notice = match result {
            Ok(_) => {
                debug!("Measurement stream closed by server");
                StreamNotice::Closed
            }
            Err(status) => {
                warn!("Measurement stream failed: {}", status);
                StreamNotice::Errored(Error::from_stream_status(status))
            }
        };
        let _ = self.notices.send(notice);
    }
}

/// Handle to a sensor's measurement stream. Clones share one session.
#[derive(Clone)]
pub struct MeasurementStream {
    inner: Arc<Inner>,
}

impl MeasurementStream {
    pub fn new(channel: Channel) -> (Self, mpsc::UnboundedReceiver<StreamNotice>) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let stream = Self {
            inner: Arc::new(Inner {
                client: SensorServiceClient::new(channel),
                state: Mutex::new(StreamState::Idle),
                generations: AtomicU64::new(0),
                notices,
            }),
        };
        (stream, receiver)
    }

    /// Opens the stream unless one is already open. A rejected token is
    /// reported asynchronously as [`StreamNotice::Errored`].
    pub fn start(&self, token: &Token) -> Result<StartOutcome> {
        let mut state = self.inner.state.lock();
        if matches!(*state, StreamState::Streaming { .. }) {
            return Ok(StartOutcome::AlreadyStreaming);
        }

        let (records, outgoing) = mpsc::channel(RECORD_BUFFER);
        let mut request = Request::new(ReceiverStream::new(outgoing));
        token.attach(&mut request)?;

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        *state = StreamState::Streaming {
            generation,
            records: Some(records),
            emitter: None,
        };
        drop(state);
        let _ = self.inner.notices.send(StreamNotice::Opened);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut client = inner.client.clone();
            let result = client.send_measurements(request).await;
            inner.finish(generation, result);
        });
        Ok(StartOutcome::Started)
    }

    /// Queues one measurement. Fire-and-forget: there is no per-record
    /// acknowledgment.
    pub fn push(&self, value: f64, made_at: DateTime<Utc>) -> Result<()> {
        self.inner.push(value, made_at)
    }

    /// Pushes a value from `source` every `period` until the stream ends.
    /// Replaces an emitter already attached to this stream.
    pub fn attach_emitter(
        &self,
        period: Duration,
        source: impl MeasurementSource,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        let StreamState::Streaming {
            records: Some(_),
            emitter,
            ..
        } = &mut *state
        else {
            return Err(Error::Usage("No stream is opened".into()));
        };

        if let Some(previous) = emitter.take() {
            previous.abort();
        }
        *emitter = Some(tokio::spawn(emit(
            Arc::downgrade(&self.inner),
            period,
            source,
        )));
        Ok(())
    }

    /// Half-closes the stream. Safe to call when no stream is open.
    pub fn end(&self) -> EndOutcome {
        let mut state = self.inner.state.lock();
        match &mut *state {
            StreamState::Streaming {
                records, emitter, ..
            } => {
                if let Some(emitter) = emitter.take() {
                    emitter.abort();
                }
                if records.take().is_some() {
                    debug!("Ending measurement stream");
                }
                EndOutcome::Ending
            }
            StreamState::Idle => EndOutcome::NoStream,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(*self.inner.state.lock(), StreamState::Streaming { .. })
    }
}

async fn emit(stream: Weak<Inner>, period: Duration, mut source: impl MeasurementSource) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = stream.upgrade() else {
            break;
        };
        let value = source.next_value();
        match inner.push(value, Utc::now()) {
            Ok(()) => trace!("Sending data: {}", value),
            Err(Error::Usage(_)) => break,
            Err(e) => warn!("Measurement dropped: {}", e),
        }
    }
}
