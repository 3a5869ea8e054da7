//! Bridge event stream with auto-reconnect.
//!
//! Connects to the bridge's `/ws` endpoint and forwards decoded
//! [`BridgeEvent`]s, interleaved with connection lifecycle messages, through
//! a bounded [`tokio::sync::mpsc`] channel. A single background task owns
//! the socket and the reconnect timer, so there is never more than one
//! pending reconnect and frames reach the consumer in arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! use homebrain_api::websocket::{EventStream, ReconnectConfig, StreamMessage};
//! use homebrain_api::TransportConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let ws_url = Url::parse("ws://insteon-bridge.local:8765/ws")?;
//! let (handle, mut rx) = EventStream::spawn(
//!     ws_url,
//!     TransportConfig::default(),
//!     ReconnectConfig::default(),
//!     CancellationToken::new(),
//! );
//!
//! while let Some(msg) = rx.recv().await {
//!     if let StreamMessage::Event(event) = msg {
//!         println!("{event:?}");
//!     }
//! }
//!
//! handle.close().await;
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::events::BridgeEvent;
use crate::transport::TransportConfig;

// ── Channel capacity ─────────────────────────────────────────────────

const STREAM_CHANNEL_CAPACITY: usize = 256;

/// How long a clean shutdown waits for the close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ── StreamMessage ────────────────────────────────────────────────────

/// Everything the stream task reports to its consumer, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A connection attempt is starting. `attempt` counts from 1 and
    /// resets after every successful connect.
    Connecting { attempt: u32 },

    /// The WebSocket handshake completed.
    Connected,

    /// A decoded frame from the bridge.
    Event(BridgeEvent),

    /// The connection failed or dropped; the next attempt starts after
    /// `retry_in`.
    Disconnected { reason: String, retry_in: Duration },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 2s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Reconnect delay state.
///
/// After `n` consecutive failures the pending delay is
/// `min(initial * 2^n, max)`; a successful connect resets it to `initial`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// The delay the next reconnect would wait.
    pub fn current(&self) -> Duration {
        calculate_backoff(self.failures, &self.config)
    }

    /// Consecutive failures since the last successful connect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure: returns the delay to wait now and doubles the
    /// next one.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Back to the floor delay.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// `min(initial * 2^attempt, max)`, without jitter.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let grown = 2_u32
        .checked_pow(attempt)
        .and_then(|factor| config.initial_delay.checked_mul(factor))
        .unwrap_or(config.max_delay);
    grown.min(config.max_delay)
}

// ── EventStream ──────────────────────────────────────────────────────

/// Owner of a running event stream task.
///
/// Dropping the handle does not stop the task; call
/// [`close`](Self::close) (or cancel the token passed to
/// [`spawn`](Self::spawn)).
#[derive(Debug)]
pub struct EventStream {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Spawn the connect/read/reconnect loop.
    ///
    /// Returns immediately; the first connection attempt happens on the
    /// background task and is reported as [`StreamMessage::Connecting`].
    pub fn spawn(
        ws_url: Url,
        transport: TransportConfig,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            stream_loop(ws_url, transport, reconnect, task_cancel, tx).await;
        });
        (Self { cancel, task }, rx)
    }

    /// Cancel any pending reconnect, close the socket and wait for the
    /// task to exit.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "event stream task panicked");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// How a single connection ended without an error.
enum SessionEnd {
    /// Shutdown was requested.
    Cancelled,
    /// Nobody is listening any more.
    ReceiverGone,
    /// The bridge closed the socket.
    Closed(String),
}

/// Main loop: connect → read → on close or error, backoff → reconnect.
async fn stream_loop(
    ws_url: Url,
    transport: TransportConfig,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<StreamMessage>,
) {
    let mut backoff = Backoff::new(reconnect);

    loop {
        let attempt = backoff.failures().saturating_add(1);
        if !emit(&tx, &cancel, StreamMessage::Connecting { attempt }).await {
            break;
        }

        let reason = match connect_and_read(&ws_url, &transport, &tx, &cancel, &mut backoff).await
        {
            Ok(SessionEnd::Cancelled | SessionEnd::ReceiverGone) => break,
            Ok(SessionEnd::Closed(reason)) => {
                tracing::info!(%reason, "event stream closed by bridge");
                reason
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "event stream error");
                e.to_string()
            }
        };

        let delay = backoff.on_failure();
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            failures = backoff.failures(),
            "waiting before reconnect"
        );
        let notice = StreamMessage::Disconnected {
            reason,
            retry_in: delay,
        };
        if !emit(&tx, &cancel, notice).await {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("event stream loop exiting");
}

/// Send to the consumer unless shutdown wins first. `false` means stop.
async fn emit(
    tx: &mpsc::Sender<StreamMessage>,
    cancel: &CancellationToken,
    msg: StreamMessage,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(msg) => sent.is_ok(),
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Classify a failed upgrade the way the HTTP paths classify responses.
fn handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(ref response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            Error::Authentication {
                status: response.status().as_u16(),
            }
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

/// Establish one WebSocket connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    transport: &TransportConfig,
    tx: &mpsc::Sender<StreamMessage>,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
) -> Result<SessionEnd, Error> {
    tracing::info!(url = %url, "connecting to bridge event stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = transport.bearer_header()? {
        let value = value
            .to_str()
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?
            .to_owned();
        request = request.with_header("Authorization", value);
    }

    let connect = tokio::time::timeout(transport.timeout, tokio_tungstenite::connect_async(request));
    let (mut ws, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        result = connect => result
            .map_err(|_| Error::Timeout { timeout_ms: transport.timeout_ms() })?
            .map_err(handshake_error)?,
    };

    tracing::info!("event stream connected");
    backoff.reset();
    if !emit(tx, cancel, StreamMessage::Connected).await {
        close_quietly(&mut ws).await;
        return Ok(if cancel.is_cancelled() {
            SessionEnd::Cancelled
        } else {
            SessionEnd::ReceiverGone
        });
    }

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                close_quietly(&mut ws).await;
                return Ok(SessionEnd::Cancelled);
            }
            frame = ws.next() => frame,
        };

        match frame {
            Some(Ok(tungstenite::Message::Text(text))) => match BridgeEvent::decode(text.as_str()) {
                Ok(event) => {
                    if !emit(tx, cancel, StreamMessage::Event(event)).await {
                        close_quietly(&mut ws).await;
                        return Ok(if cancel.is_cancelled() {
                            SessionEnd::Cancelled
                        } else {
                            SessionEnd::ReceiverGone
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable event frame");
                }
            },
            Some(Ok(tungstenite::Message::Ping(_))) => {
                // tungstenite answers pings itself
                tracing::trace!("event stream ping");
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "close frame without payload".to_owned(),
                    |cf| format!("close code {}: {}", cf.code, cf.reason),
                );
                return Ok(SessionEnd::Closed(reason));
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => return Ok(SessionEnd::Closed("stream ended".to_owned())),
            Some(Ok(_)) => {
                // Binary, Pong, raw frames
            }
        }
    }
}

async fn close_quietly<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match tokio::time::timeout(CLOSE_GRACE, ws.close(None)).await {
        Ok(Ok(())) => tracing::debug!("event stream closed"),
        Ok(Err(e)) => tracing::debug!(error = %e, "event stream close failed"),
        Err(_) => tracing::debug!("event stream close timed out"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
