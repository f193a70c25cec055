//! Task board server core: shared state, WebSocket feed, and REST API.
//!
//! Every WebSocket client at `/ws/tasks` receives a full snapshot
//! immediately after connecting, then every mutation as a
//! `task_created`/`task_updated` broadcast — one JSON object per text frame.
//! The REST API mutates the store; its responses never carry feed messages,
//! clients observe effects through the broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use taskwire_proto::message::{self, ServerMessage};
use taskwire_proto::task::{ClaimTask, NewTask, Task};

use crate::store::TaskStore;

/// Shared server state: the task store and the connected feed clients.
pub struct BoardState {
    /// Authoritative task collection.
    pub store: TaskStore,
    /// Maps a connection id to the sender half of its outbound frame channel.
    clients: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_client_id: AtomicU64,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    /// Creates state with an empty store and no clients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: TaskStore::new(),
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(0),
        }
    }

    /// Registers a feed client, returning its connection id.
    async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, sender);
        id
    }

    /// Removes a feed client.
    async fn unregister(&self, id: u64) {
        self.clients.write().await.remove(&id);
    }

    /// Number of currently connected feed clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Broadcasts a message to every connected feed client.
    ///
    /// Clients whose channel has closed are dropped from the registry.
    pub async fn broadcast(&self, msg: &ServerMessage) {
        let json = match message::encode(msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast message");
                return;
            }
        };

        let mut clients = self.clients.write().await;
        clients.retain(|client_id, sender| {
            let delivered = sender.send(Message::Text(json.clone().into())).is_ok();
            if !delivered {
                tracing::debug!(client_id = client_id, "dropping disconnected feed client");
            }
            delivered
        });
        tracing::debug!(kind = msg.kind(), clients = clients.len(), "broadcast sent");
    }

    /// Creates a task from a validated payload and broadcasts the creation.
    pub async fn create_task(&self, new: &NewTask) -> Task {
        let task = self.store.create(new).await;
        tracing::info!(id = %task.id, title = %task.title, "task created");
        self.broadcast(&ServerMessage::TaskCreated { task: task.clone() })
            .await;
        task
    }

    /// Claims a task and broadcasts the update. `None` for an unknown id.
    pub async fn claim_task(&self, id: &str, assignee: &str) -> Option<Task> {
        let task = self.store.claim(id, assignee).await?;
        tracing::info!(id = %task.id, assignee = assignee, "task claimed");
        self.broadcast(&ServerMessage::TaskUpdated { task: task.clone() })
            .await;
        Some(task)
    }
}

/// REST error payload, rendered as `{"detail": "..."}` with the mapped
/// status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request payload failed validation.
    #[error("{0}")]
    Invalid(String),
    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

/// Query parameters for `GET /tasks/search`.
#[derive(Debug, serde::Deserialize)]
pub struct SearchParams {
    /// Title substring to match.
    #[serde(default)]
    pub title: String,
}

/// Builds the task board router over shared state.
pub fn router(state: Arc<BoardState>) -> axum::Router {
    axum::Router::new()
        .route("/ws/tasks", axum::routing::get(ws_handler))
        .route(
            "/tasks",
            axum::routing::post(create_task).get(list_tasks),
        )
        .route("/tasks/{id}/claim", axum::routing::put(claim_task))
        .route("/tasks/search", axum::routing::get(search_tasks))
        .with_state(state)
}

/// `POST /tasks` — validate, create, broadcast.
async fn create_task(
    State(state): State<Arc<BoardState>>,
    Json(payload): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let payload = payload.sanitized();
    payload
        .validate()
        .map_err(|e| ApiError::Invalid(e.to_string()))?;
    let task = state.create_task(&payload).await;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks` — the full board, newest first.
async fn list_tasks(State(state): State<Arc<BoardState>>) -> Json<Vec<Task>> {
    Json(state.store.all().await)
}

/// `PUT /tasks/{id}/claim` — validate, claim, broadcast.
async fn claim_task(
    State(state): State<Arc<BoardState>>,
    Path(id): Path<String>,
    Json(payload): Json<ClaimTask>,
) -> Result<Json<Task>, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::Invalid(e.to_string()))?;
    let task = state
        .claim_task(&id, payload.assignee.trim())
        .await
        .ok_or_else(|| ApiError::NotFound(id))?;
    Ok(Json(task))
}

/// `GET /tasks/search?title=` — title search; empty list, never 404.
async fn search_tasks(
    State(state): State<Arc<BoardState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Task>> {
    Json(state.store.search_by_title(&params.title).await)
}

/// axum handler that upgrades an HTTP request to a feed WebSocket.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<Arc<BoardState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one feed connection.
///
/// Lifecycle:
/// 1. Send a full snapshot so the client is synchronized before any delta.
/// 2. Register the client for broadcasts.
/// 3. Forward broadcast frames from the channel to the socket; read and
///    discard inbound frames (the feed is server-to-client only).
/// 4. On disconnect, unregister.
async fn handle_socket(socket: WebSocket, state: Arc<BoardState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let snapshot = ServerMessage::Snapshot {
        tasks: state.store.all().await,
    };
    let snapshot_json = match message::encode(&snapshot) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode snapshot");
            return;
        }
    };
    if ws_sender
        .send(Message::Text(snapshot_json.into()))
        .await
        .is_err()
    {
        tracing::warn!("feed client dropped before snapshot delivery");
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client_id = state.register(tx).await;
    tracing::info!(client_id = client_id, "feed client connected");

    // Writer task: channel → socket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Reader task: drain inbound frames until the client goes away.
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                _ => {
                    // The feed is read-only from the client side.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    state.unregister(client_id).await;
    tracing::info!(client_id = client_id, "feed client disconnected");
}

/// Starts the server on the given address and returns the bound address and
/// a join handle.
///
/// The primary entry point for both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BoardState::new())).await
}

/// Starts the server with pre-built state (e.g. a seeded store).
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BoardState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "task board server error");
        }
    });

    Ok((bound_addr, handle))
}
