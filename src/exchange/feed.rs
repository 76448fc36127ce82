use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ClientError, ClientResult};

/// An open subscription to one push stream.
///
/// `frames` yields raw text frames in arrival order. The feed closes it when
/// the stream has ended for any reason, which is the completion
/// notification. Cancelling `stop` asks the feed to disconnect; completion
/// follows once it has.
#[derive(Debug)]
pub struct FeedSubscription {
    pub frames: mpsc::Receiver<String>,
    pub stop: CancellationToken,
}

/// Source of raw push frames, one subscription per stream name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushFeed: Send + Sync {
    /// Opens `stream` (e.g. `btcusdt@kline_1m`). A rejected stream name is a
    /// [`ClientError::Subscription`].
    async fn subscribe(&self, stream: &str) -> ClientResult<FeedSubscription>;
}

/// WebSocket push feed: one connection per subscription on `{base_url}/{stream}`.
#[derive(Debug, Clone)]
pub struct WsFeed {
    base_url: String,
    buffer: usize,
}

impl WsFeed {
    pub fn new(base_url: impl Into<String>, buffer: usize) -> Self {
        Self {
            base_url: base_url.into(),
            buffer: buffer.max(1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn pump(
        stream: String,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        frames: mpsc::Sender<String>,
        stop: CancellationToken,
    ) {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let delivered = tokio::select! {
                            res = frames.send(text) => res.is_ok(),
                            _ = stop.cancelled() => false,
                        };
                        if !delivered {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!(stream = %stream, "Received ping, sending pong");
                        if write.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(stream = %stream, "WebSocket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(stream = %stream, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }

        if stop.is_cancelled() {
            debug!(stream = %stream, "Stop requested, closing WebSocket");
            let _ = write.send(Message::Close(None)).await;
        }
        // `frames` drops here, which completes the subscription.
    }
}

#[async_trait]
impl PushFeed for WsFeed {
    async fn subscribe(&self, stream: &str) -> ClientResult<FeedSubscription> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), stream);
        info!("Connecting to WebSocket: {}", url);

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Subscription {
                stream: stream.to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let stop = CancellationToken::new();
        tokio::spawn(Self::pump(stream.to_string(), ws, tx, stop.clone()));

        Ok(FeedSubscription { frames: rx, stop })
    }
}
