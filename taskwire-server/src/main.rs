//! Taskwire task board server.
//!
//! Serves the WebSocket task feed and the REST mutation/query API.
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin taskwire-server
//!
//! # Run on custom address
//! cargo run --bin taskwire-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! TASKWIRE_ADDR=127.0.0.1:8080 cargo run --bin taskwire-server
//! ```

use clap::Parser;

use taskwire_server::config::{ServerCliArgs, ServerConfig};
use taskwire_server::server;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskwire server");

    match server::start_server(&config.bind_addr).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskwire server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
