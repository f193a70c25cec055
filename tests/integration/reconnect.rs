// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for automatic reconnection with backoff.
//!
//! ## Disconnect simulation
//!
//! Aborting the server's `JoinHandle` does not close WebSocket connections
//! already handed to independently-spawned tasks. Instead a **TCP proxy**
//! sits between the client and the real server; killing the proxy aborts
//! every proxied connection task, dropping both `TcpStream`s and surfacing
//! an immediate disconnect to the client's WebSocket layer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskwire::backoff::BackoffPolicy;
use taskwire::client::SyncClient;
use taskwire::config::ClientConfig;
use taskwire::conn::{ConnectionPhase, ConnectionStatus};
use taskwire_proto::message::ServerMessage;
use taskwire_proto::task::NewTask;
use taskwire_server::server::{BoardState, start_server_with_state};

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// A TCP proxy forwarding between a client-facing port and a backend server.
/// `kill()` aborts all tracked connection tasks, tearing down both directions
/// of every proxied connection.
struct TcpProxy {
    /// Address clients should connect to (`127.0.0.1:<proxy_port>`).
    client_addr: String,
    accept_handle: tokio::task::JoinHandle<()>,
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    async fn new(proxy_port: u16, backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{proxy_port}"))
            .await
            .unwrap_or_else(|e| panic!("proxy: failed to bind port {proxy_port}: {e}"));
        let bound_addr = listener.local_addr().unwrap();
        let client_addr = format!("127.0.0.1:{}", bound_addr.port());
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            loop {
                let Ok((mut client_stream, _)) = listener.accept().await else {
                    break;
                };
                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };
                    // Aborting this task drops both streams immediately.
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });
                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            client_addr,
            accept_handle,
            conn_handles,
        }
    }

    /// Kill the proxy, severing all connections immediately.
    fn kill(self) {
        self.accept_handle.abort();
        let handles = self.conn_handles.lock();
        for h in handles.iter() {
            h.abort();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn find_free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

fn fast_config(proxy_addr: &str) -> ClientConfig {
    ClientConfig {
        server_url: Some(format!("http://{proxy_addr}")),
        connect_timeout: Duration::from_secs(5),
        reconnect: BackoffPolicy {
            base: Duration::from_millis(100),
            growth: 1.5,
            cap: Duration::from_secs(5),
            max_attempts: 5,
        },
    }
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        assignee: None,
    }
}

fn observed_client(
    config: &ClientConfig,
) -> (
    Arc<SyncClient>,
    mpsc::UnboundedReceiver<ConnectionStatus>,
    mpsc::UnboundedReceiver<ServerMessage>,
) {
    let client = Arc::new(SyncClient::new(config).expect("client build failed"));
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    client.on_status(move |status| {
        let _ = status_tx.send(status.clone());
    });
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    client.on_message(move |msg: &ServerMessage| {
        let _ = msg_tx.send(msg.clone());
    });
    (client, status_rx, msg_rx)
}

async fn wait_for<F>(
    rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>,
    description: &str,
    pred: F,
) -> ConnectionStatus
where
    F: Fn(&ConnectionStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(status)) if pred(&status) => return status,
            Ok(Some(_)) => {}
            Ok(None) => panic!("status channel closed waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

async fn wait_for_connected(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    wait_for(rx, "Connected", |s| s.phase == ConnectionPhase::Connected).await
}

async fn wait_for_scheduled(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    wait_for(rx, "ReconnectScheduled", |s| {
        s.phase == ConnectionPhase::ReconnectScheduled
    })
    .await
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for feed message")
        .expect("message channel closed")
}

// =============================================================================
// Test 1: full drop/reconnect/resync scenario
// =============================================================================

/// The end-to-end scenario: snapshot with 2 tasks, a third created live,
/// connection severed, backoff reconnect to a board that now holds exactly
/// one task, and a fresh snapshot replacing the stale collection. Also
/// verifies the attempt counter reset: the failure after a successful
/// reconnection schedules with `attempt == 1` again.
#[tokio::test]
async fn drop_reconnect_resyncs_with_fresh_snapshot() {
    // Backend A: two seeded tasks.
    let state_a = Arc::new(BoardState::new());
    state_a.store.create(&new_task("Seed one")).await;
    state_a.store.create(&new_task("Seed two")).await;
    let (addr_a, _handle_a) = start_server_with_state("127.0.0.1:0", Arc::clone(&state_a))
        .await
        .expect("server A start failed");

    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &addr_a.to_string()).await;
    let proxy_addr = proxy.client_addr.clone();

    let (client, mut status_rx, mut msg_rx) = observed_client(&fast_config(&proxy_addr));
    client.start();

    wait_for_connected(&mut status_rx).await;
    let snapshot = next_message(&mut msg_rx).await;
    assert!(matches!(snapshot, ServerMessage::Snapshot { tasks } if tasks.len() == 2));

    // A third task arrives live and lands at the front.
    state_a.create_task(&new_task("Live third")).await;
    let created = next_message(&mut msg_rx).await;
    assert!(matches!(created, ServerMessage::TaskCreated { .. }));
    let tasks = client.tasks();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].title, "Live third");

    // Sever the link.
    proxy.kill();
    let scheduled = wait_for_scheduled(&mut status_rx).await;
    assert_eq!(scheduled.attempt, 1, "first reconnect attempt should be 1");

    // Backend B behind a fresh proxy on the same port: a board of one task.
    let state_b = Arc::new(BoardState::new());
    state_b.store.create(&new_task("Only survivor")).await;
    let (addr_b, _handle_b) = start_server_with_state("127.0.0.1:0", Arc::clone(&state_b))
        .await
        .expect("server B start failed");
    let proxy2 = TcpProxy::new(proxy_port, &addr_b.to_string()).await;

    wait_for_connected(&mut status_rx).await;

    // The reconnect snapshot fully replaces the stale 3-task collection.
    let resync = loop {
        match next_message(&mut msg_rx).await {
            msg @ ServerMessage::Snapshot { .. } => break msg,
            _ => {}
        }
    };
    assert!(matches!(resync, ServerMessage::Snapshot { tasks } if tasks.len() == 1));
    let tasks = client.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Only survivor");

    // Counter reset check: the next failure schedules from attempt 1.
    proxy2.kill();
    let rescheduled = wait_for_scheduled(&mut status_rx).await;
    assert_eq!(
        rescheduled.attempt, 1,
        "attempt counter must reset after a successful connection"
    );

    client.stop().await;
}

// =============================================================================
// Test 2: backoff growth
// =============================================================================

#[tokio::test]
async fn backoff_gaps_grow_between_attempts() {
    // Nothing ever listens: every connect attempt fails immediately.
    let port = find_free_port().await;
    let mut config = fast_config(&format!("127.0.0.1:{port}"));
    config.reconnect.max_attempts = 4;

    let (client, mut status_rx, _msg_rx) = observed_client(&config);
    client.start();

    // Timestamps of the first three ReconnectScheduled publishes. The gap
    // between consecutive ones is the armed delay plus the (fast) failing
    // connect, so gaps must grow with the exponential policy.
    let mut instants = Vec::new();
    for expected_attempt in 1..=3 {
        let status = wait_for_scheduled(&mut status_rx).await;
        assert_eq!(status.attempt, expected_attempt);
        instants.push(Instant::now());
    }

    let gap_1_to_2 = instants[1] - instants[0];
    let gap_2_to_3 = instants[2] - instants[1];
    assert!(
        gap_1_to_2 >= Duration::from_millis(140),
        "gap between attempts 1 and 2 too short: {gap_1_to_2:?}"
    );
    assert!(
        gap_2_to_3 > gap_1_to_2,
        "gap 2->3 ({gap_2_to_3:?}) should exceed gap 1->2 ({gap_1_to_2:?})"
    );

    client.stop().await;
}

// =============================================================================
// Test 3: terminal exhaustion and manual restart
// =============================================================================

#[tokio::test]
async fn exhausted_retries_terminal_then_manual_restart_works() {
    let port = find_free_port().await;
    let mut config = fast_config(&format!("127.0.0.1:{port}"));
    config.reconnect.max_attempts = 3;

    let (client, mut status_rx, mut msg_rx) = observed_client(&config);
    client.start();

    let terminal = wait_for(&mut status_rx, "terminal Disconnected", |s| s.terminal).await;
    assert_eq!(terminal.phase, ConnectionPhase::Disconnected);
    assert_eq!(terminal.attempt, 3);

    // No further attempts happen on their own.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(status_rx.try_recv().is_err());

    // The core stays capable of a manual restart: bring a server up on the
    // same port and start again.
    let state = Arc::new(BoardState::new());
    state.store.create(&new_task("Back online")).await;
    let (_addr, _handle) =
        start_server_with_state(&format!("127.0.0.1:{port}"), Arc::clone(&state))
            .await
            .expect("server start failed");

    client.start();
    wait_for_connected(&mut status_rx).await;
    let msg = next_message(&mut msg_rx).await;
    assert!(matches!(msg, ServerMessage::Snapshot { tasks } if tasks.len() == 1));

    client.stop().await;
}

// =============================================================================
// Test 4: stop cancels a pending reconnect timer
// =============================================================================

#[tokio::test]
async fn stop_cancels_pending_reconnect_timer() {
    let port = find_free_port().await;
    let mut config = fast_config(&format!("127.0.0.1:{port}"));
    // Long enough that an uncancelled timer would blow the test budget.
    config.reconnect.base = Duration::from_secs(30);
    config.reconnect.cap = Duration::from_secs(60);

    let (client, mut status_rx, _msg_rx) = observed_client(&config);
    client.start();

    wait_for_scheduled(&mut status_rx).await;

    let started = Instant::now();
    client.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "stop() should cancel the armed reconnect sleep, took {:?}",
        started.elapsed()
    );

    let last = wait_for(&mut status_rx, "final Disconnected", |s| {
        s.phase == ConnectionPhase::Disconnected
    })
    .await;
    assert!(!last.terminal);
}

// =============================================================================
// Test 5: messages lost while disconnected are covered by the resync snapshot
// =============================================================================

#[tokio::test]
async fn mutations_during_outage_appear_after_resync() {
    let state = Arc::new(BoardState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("server start failed");

    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &addr.to_string()).await;
    let proxy_addr = proxy.client_addr.clone();

    let (client, mut status_rx, mut msg_rx) = observed_client(&fast_config(&proxy_addr));
    client.start();
    wait_for_connected(&mut status_rx).await;
    let _ = next_message(&mut msg_rx).await;

    proxy.kill();
    wait_for_scheduled(&mut status_rx).await;

    // Mutations while the client is away: the broadcast frames are lost,
    // but the store moves on.
    state.create_task(&new_task("Made during outage")).await;

    let _proxy2 = TcpProxy::new(proxy_port, &addr.to_string()).await;
    wait_for_connected(&mut status_rx).await;

    let resync = loop {
        match next_message(&mut msg_rx).await {
            msg @ ServerMessage::Snapshot { .. } => break msg,
            _ => {}
        }
    };
    assert!(matches!(resync, ServerMessage::Snapshot { tasks } if tasks.len() == 1));
    assert_eq!(client.tasks()[0].title, "Made during outage");

    client.stop().await;
}
