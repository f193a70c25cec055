//! Taskwire — task board watcher CLI.
//!
//! Connects to a task board server, keeps the local collection in sync, and
//! logs every connection transition and board change until interrupted.
//!
//! ```bash
//! cargo run --bin taskwire -- --server-url http://127.0.0.1:8000
//!
//! # Or via environment variables
//! TASKWIRE_SERVER=http://127.0.0.1:8000 cargo run --bin taskwire
//! ```

use std::sync::Arc;

use clap::Parser;

use taskwire::client::SyncClient;
use taskwire::config::{CliArgs, ClientConfig};
use taskwire::conn::ConnectionPhase;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let client = match SyncClient::new(&config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(error = %e, "cannot build sync client");
            std::process::exit(1);
        }
    };

    tracing::info!(url = client.feed_url(), "taskwire starting");

    client.on_status(|status| match status.phase {
        ConnectionPhase::Connected => tracing::info!("connected"),
        ConnectionPhase::Connecting => tracing::info!(attempt = status.attempt, "connecting"),
        ConnectionPhase::ReconnectScheduled => tracing::warn!(
            attempt = status.attempt,
            error = status.last_error.as_deref().unwrap_or("unknown"),
            "connection lost, reconnect scheduled"
        ),
        ConnectionPhase::Disconnected => {
            if status.terminal {
                tracing::error!(
                    attempt = status.attempt,
                    "reconnect attempts exhausted, giving up"
                );
            } else {
                tracing::info!("disconnected");
            }
        }
    });

    let board_client = Arc::clone(&client);
    client.on_message(move |msg| {
        let tasks = board_client.tasks();
        let newest = tasks.first().map_or("-", |t| t.title.as_str());
        tracing::info!(
            kind = msg.kind(),
            total = tasks.len(),
            newest = newest,
            "board updated"
        );
    });

    client.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }

    tracing::info!("shutting down");
    client.stop().await;
}
