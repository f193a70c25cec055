//! WebSocket connection supervisor.
//!
//! Owns the single logical connection to the task feed: opens the socket,
//! pumps inbound frames through the validator into the [`Dispatcher`], and
//! on loss arms exactly one single-shot reconnect sleep with an explicit
//! attempt counter from [`BackoffPolicy`]. Because the whole lifecycle runs
//! in one task, frames from an abandoned connection can never race a newer
//! attempt — the next connection is only opened after the previous read loop
//! has returned.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskwire_proto::message;

use crate::backoff::BackoffPolicy;
use crate::dispatch::Dispatcher;

/// Type alias for a client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle phase of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No transport open and none pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
    /// The transport was lost; a reconnect timer is armed.
    ReconnectScheduled,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::ReconnectScheduled => write!(f, "reconnect_scheduled"),
        }
    }
}

/// Connection state as published to status subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current lifecycle phase.
    pub phase: ConnectionPhase,
    /// Consecutive failed attempts since the last successful open.
    pub attempt: u32,
    /// Set on `Disconnected` once retries are exhausted; a manual restart
    /// is the only way forward.
    pub terminal: bool,
    /// Description of the most recent transport failure, if any.
    pub last_error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt: 0,
            terminal: false,
            last_error: None,
        }
    }
}

/// Settings the supervisor needs, resolved by the client facade.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Fully derived ws/wss feed URL.
    pub url: String,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Reconnect delay policy.
    pub backoff: BackoffPolicy,
}

/// Why the read loop ended.
enum ReadEnd {
    /// `stop()` was requested; tear down without rescheduling.
    Shutdown,
    /// The transport closed or errored; reschedule per backoff.
    Lost(Option<String>),
}

/// Supervisor loop: connect, pump, reschedule until stopped or exhausted.
///
/// Every state transition is published synchronously through the dispatcher
/// before the loop proceeds.
pub(crate) async fn run(
    cfg: ConnConfig,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut last_error: Option<String> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        publish(
            &dispatcher,
            ConnectionPhase::Connecting,
            attempt,
            false,
            last_error.clone(),
        );

        let outcome = tokio::select! {
            res = tokio::time::timeout(cfg.connect_timeout, connect_async(cfg.url.as_str())) => Some(res),
            _ = shutdown.changed() => None,
        };
        let Some(outcome) = outcome else { break };

        match outcome {
            Ok(Ok((ws, _response))) => {
                tracing::info!(url = %cfg.url, "task feed connected");
                attempt = 0;
                last_error = None;
                publish(&dispatcher, ConnectionPhase::Connected, 0, false, None);

                match read_frames(ws, &dispatcher, &mut shutdown).await {
                    ReadEnd::Shutdown => break,
                    ReadEnd::Lost(err) => last_error = err,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %cfg.url, err = %e, "task feed connect failed");
                last_error = Some(describe_connect_error(&e));
            }
            Err(_elapsed) => {
                tracing::warn!(url = %cfg.url, "task feed connect timed out");
                last_error = Some("connection attempt timed out".to_string());
            }
        }

        if *shutdown.borrow() {
            break;
        }

        attempt += 1;
        match cfg.backoff.next_delay(attempt) {
            Some(delay) => {
                tracing::info!(
                    attempt = attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconnect scheduled"
                );
                publish(
                    &dispatcher,
                    ConnectionPhase::ReconnectScheduled,
                    attempt,
                    false,
                    last_error.clone(),
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
            None => {
                tracing::warn!(attempt = attempt, "reconnect attempts exhausted");
                publish(
                    &dispatcher,
                    ConnectionPhase::Disconnected,
                    attempt,
                    true,
                    last_error.clone(),
                );
                return;
            }
        }
    }

    publish(
        &dispatcher,
        ConnectionPhase::Disconnected,
        attempt,
        false,
        last_error,
    );
    tracing::info!("task feed supervisor exiting");
}

/// Reads frames until the socket closes, errors, or a stop is requested.
///
/// Text frames go through the validator; rejected frames are logged and
/// dropped without touching connection state. Non-text frames are ignored.
async fn read_frames(
    mut ws: WsStream,
    dispatcher: &Dispatcher,
    shutdown: &mut watch::Receiver<bool>,
) -> ReadEnd {
    loop {
        let frame = tokio::select! {
            frame = ws.next() => frame,
            _ = shutdown.changed() => {
                let _ = ws.close(None).await;
                return ReadEnd::Shutdown;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => match message::parse(text.as_str()) {
                Ok(msg) => {
                    tracing::debug!(kind = msg.kind(), "feed message received");
                    dispatcher.publish_message(&msg);
                }
                Err(rejection) => {
                    // Protocol violations are dropped locally, never fatal.
                    tracing::warn!(reason = %rejection, "dropping invalid frame");
                }
            },
            Some(Ok(Message::Close(_))) => {
                tracing::info!("task feed closed by server");
                return ReadEnd::Lost(Some("closed by server".to_string()));
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!("ignoring unexpected binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                // Control frames are handled by the transport layer.
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "task feed read error");
                return ReadEnd::Lost(Some(e.to_string()));
            }
            None => {
                tracing::info!("task feed stream ended");
                return ReadEnd::Lost(Some("stream ended".to_string()));
            }
        }
    }
}

/// Publishes a state transition to all status subscribers.
fn publish(
    dispatcher: &Dispatcher,
    phase: ConnectionPhase,
    attempt: u32,
    terminal: bool,
    last_error: Option<String>,
) {
    dispatcher.publish_status(&ConnectionStatus {
        phase,
        attempt,
        terminal,
        last_error,
    });
}

/// Renders a `tokio_tungstenite` connection error for status reporting.
fn describe_connect_error(err: &tokio_tungstenite::tungstenite::Error) -> String {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => format!("io error: {io_err}"),
        WsError::Tls(tls_err) => format!("tls error: {tls_err}"),
        WsError::Http(response) => format!("http error: status {}", response.status()),
        other => format!("connection error: {other}"),
    }
}
