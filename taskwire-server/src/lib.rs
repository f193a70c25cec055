//! Taskwire task board server library.
//!
//! Exposes the server for use in tests and embedding. The server pushes a
//! task snapshot to every WebSocket client on connect, broadcasts task
//! mutations, and serves the REST mutation/query API.

pub mod config;
pub mod server;
pub mod store;
