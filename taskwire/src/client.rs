//! Client facade wiring the connection supervisor, dispatcher, and board.
//!
//! [`SyncClient`] is an explicitly constructed, explicitly owned instance —
//! there is no process-wide singleton, so tests and embedders can run any
//! number of independent clients. The board is registered as the first
//! message subscriber, so by the time any later subscriber observes a
//! message the collection already reflects it.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use url::Url;

use taskwire_proto::message::ServerMessage;
use taskwire_proto::task::Task;

use crate::board::TaskBoard;
use crate::config::ClientConfig;
use crate::conn::{self, ConnConfig, ConnectionStatus};
use crate::dispatch::{Dispatcher, SubscriptionId};

/// Errors constructing or starting a [`SyncClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No server URL was configured.
    #[error("no server URL configured")]
    MissingServerUrl,

    /// The configured server URL does not parse.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// The configured server URL has a scheme the feed cannot use.
    #[error("unsupported URL scheme {0:?} (expected http, https, ws, or wss)")]
    UnsupportedScheme(String),
}

/// Handle to a running supervisor task.
struct Supervisor {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// Task feed sync client.
///
/// Construct with [`SyncClient::new`], call [`start`](Self::start) inside a
/// tokio runtime, and read the reconciled collection with
/// [`tasks`](Self::tasks). Status and message subscribers are notified
/// synchronously as the feed progresses.
pub struct SyncClient {
    conn_config: ConnConfig,
    dispatcher: Arc<Dispatcher>,
    board: Arc<RwLock<TaskBoard>>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl SyncClient {
    /// Builds a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the server URL is missing or cannot be
    /// turned into a feed URL.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = config
            .server_url
            .as_deref()
            .ok_or(ClientError::MissingServerUrl)?;
        let url = feed_url(base)?;

        let dispatcher = Arc::new(Dispatcher::new());
        let board = Arc::new(RwLock::new(TaskBoard::new()));

        // The board folds every message before other subscribers see it.
        let fold_board = Arc::clone(&board);
        dispatcher.subscribe_messages(move |msg| {
            fold_board.write().apply(msg);
        });

        Ok(Self {
            conn_config: ConnConfig {
                url: url.to_string(),
                connect_timeout: config.connect_timeout,
                backoff: config.reconnect.clone(),
            },
            dispatcher,
            board,
            supervisor: Mutex::new(None),
        })
    }

    /// Starts the connection supervisor. Idempotent: a no-op while a
    /// supervisor is already running. After a terminal disconnect (retries
    /// exhausted) or a [`stop`](Self::stop), calling this begins a fresh
    /// connection cycle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut slot = self.supervisor.lock();
        if let Some(existing) = slot.as_ref()
            && !existing.task.is_finished()
        {
            tracing::debug!("start() ignored, supervisor already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(conn::run(
            self.conn_config.clone(),
            Arc::clone(&self.dispatcher),
            shutdown_rx,
        ));
        *slot = Some(Supervisor {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Stops the client: releases the transport and cancels any pending
    /// reconnect timer, then waits for the supervisor to wind down. Safe to
    /// call when not running.
    pub async fn stop(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.shutdown.send(true);
            let _ = supervisor.task.await;
        }
    }

    /// Registers a handler for every validated feed message.
    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_messages(handler)
    }

    /// Registers a handler for connection status transitions. The handler is
    /// immediately invoked with the current status.
    pub fn on_status<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_status(handler)
    }

    /// Removes a message subscriber.
    pub fn unsubscribe_message(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe_messages(id)
    }

    /// Removes a status subscriber.
    pub fn unsubscribe_status(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe_status(id)
    }

    /// The current connection status.
    #[must_use]
    pub fn current_status(&self) -> ConnectionStatus {
        self.dispatcher.current_status()
    }

    /// Read-only copy of the reconciled task collection, in display order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.board.read().tasks()
    }

    /// Number of tasks currently on the board.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.board.read().len()
    }

    /// The derived feed URL this client connects to.
    #[must_use]
    pub fn feed_url(&self) -> &str {
        &self.conn_config.url
    }
}

/// Derives the task feed URL from a server base URL.
///
/// Scheme mapping follows the page-scheme convention: `http` → `ws`,
/// `https` → `wss`; explicit `ws`/`wss` pass through. The path is always
/// `/ws/tasks`.
///
/// # Errors
///
/// Returns [`ClientError`] for unparseable URLs, unsupported schemes, or a
/// missing host.
pub fn feed_url(base: &str) -> Result<Url, ClientError> {
    let base = Url::parse(base).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    let host = base
        .host_str()
        .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?;

    let mut derived = format!("{scheme}://{host}");
    if let Some(port) = base.port() {
        derived.push_str(&format!(":{port}"));
    }
    derived.push_str("/ws/tasks");
    Url::parse(&derived).map_err(|e| ClientError::InvalidUrl(e.to_string()))
}
