//! Relays one push feed into a typed, cancellable event stream.
//!
//! A relay runs as a single spawned task that joins two units: the forwarding
//! loop, which decodes each frame and sends it downstream, and the
//! cancellation watcher, which turns the caller's token into a stop request
//! on the feed. The forwarding loop owns the only sender, so the output
//! closes exactly once: when the feed reports completion.

use futures_util::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::feed::{FeedSubscription, PushFeed};
use crate::error::{ClientResult, ConversionError};

/// Lifecycle of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Idle,
    Subscribing,
    Streaming,
    Closing,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Subscribing => "subscribing",
            StreamState::Streaming => "streaming",
            StreamState::Closing => "closing",
            StreamState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Receiving end of a relay.
///
/// Yields events in feed order and ends after the relay has torn down.
pub struct EventStream<T> {
    name: String,
    events: mpsc::Receiver<T>,
    state: watch::Receiver<StreamState>,
    closed: CancellationToken,
}

impl<T> EventStream<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.events.recv().await
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Fires once the relay has reached [`StreamState::Closed`].
    pub fn closed_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Subscribes to `stream` on `feed` and starts relaying decoded frames.
///
/// Returns once the subscription is acknowledged. Frames that `decode`
/// rejects are logged and dropped; the stream keeps running.
pub async fn open_stream<T, F>(
    feed: &dyn PushFeed,
    stream: String,
    cancel: CancellationToken,
    buffer: usize,
    decode: F,
) -> ClientResult<EventStream<T>>
where
    T: Send + 'static,
    F: Fn(&str) -> Result<T, ConversionError> + Send + 'static,
{
    let (state_tx, state_rx) = watch::channel(StreamState::Idle);

    state_tx.send_replace(StreamState::Subscribing);
    debug!(stream = %stream, "Subscribing");
    let subscription = match feed.subscribe(&stream).await {
        Ok(subscription) => subscription,
        Err(e) => {
            state_tx.send_replace(StreamState::Closed);
            warn!(stream = %stream, "Subscription failed: {}", e);
            return Err(e);
        }
    };
    state_tx.send_replace(StreamState::Streaming);

    let (tx, rx) = mpsc::channel(buffer.max(1));
    let closed = CancellationToken::new();

    tokio::spawn(run_relay(
        stream.clone(),
        subscription,
        cancel,
        tx,
        state_tx,
        closed.clone(),
        decode,
    ));

    Ok(EventStream {
        name: stream,
        events: rx,
        state: state_rx,
        closed,
    })
}

async fn run_relay<T, F>(
    stream: String,
    subscription: FeedSubscription,
    cancel: CancellationToken,
    tx: mpsc::Sender<T>,
    state_tx: watch::Sender<StreamState>,
    closed: CancellationToken,
    decode: F,
) where
    F: Fn(&str) -> Result<T, ConversionError>,
{
    let FeedSubscription { mut frames, stop } = subscription;
    let feed_done = CancellationToken::new();

    let stream = stream.as_str();
    let state = &state_tx;
    let stop = &stop;
    let cancel = &cancel;
    let feed_done_ref = &feed_done;

    let watcher = async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(stream = %stream, "Cancellation requested, stopping feed");
                state.send_replace(StreamState::Closing);
                stop.cancel();
            }
            _ = feed_done_ref.cancelled() => {}
        }
    };

    let forwarder = async move {
        let mut forwarded = 0u64;
        let mut dropped = 0u64;
        let mut consumer_gone = false;

        loop {
            let frame = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = tx.closed(), if !consumer_gone => {
                    debug!(stream = %stream, "Consumer dropped, stopping feed");
                    consumer_gone = true;
                    stop.cancel();
                    continue;
                }
            };

            // Past cancellation or a vanished consumer the feed is only drained.
            if cancel.is_cancelled() || consumer_gone {
                continue;
            }

            match decode(&frame) {
                Ok(event) => {
                    if tx.send(event).await.is_ok() {
                        forwarded += 1;
                    }
                }
                Err(ConversionError::UnsupportedEvent(kind)) => {
                    debug!(stream = %stream, "Ignoring {} event", kind);
                }
                Err(e) => {
                    dropped += 1;
                    warn!(stream = %stream, "Dropping frame: {}", e);
                }
            }
        }

        feed_done_ref.cancel();
        state.send_replace(StreamState::Closing);
        drop(tx);
        info!(
            stream = %stream,
            forwarded,
            dropped,
            "Feed completed"
        );
    };

    tokio::join!(watcher, forwarder);

    state_tx.send_replace(StreamState::Closed);
    closed.cancel();
}
