//! # tdbridge-server
//!
//! Multiplexes WebSocket clients onto one engine.
//!
//! - [`registry::ClientRegistry`]: client key → engine client id, created lazily
//! - [`poller::EnginePoller`]: the single engine consumer
//! - [`fanout::Fanout`]: filters engine output per connection
//! - [`websocket`]: the per-connection session
//! - [`server::BridgeServer`]: axum router, `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod health;
pub mod metrics;
pub mod poller;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use bridge::Bridge;
pub use config::ServerConfig;
pub use errors::{BridgeError, ServerError};
pub use server::BridgeServer;
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
