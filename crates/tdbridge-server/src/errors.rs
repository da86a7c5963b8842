//! Server error types.

use std::io;

/// Errors from [`crate::bridge::Bridge`] lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A poll loop is already consuming this engine.
    #[error("engine poll loop is already running")]
    PollerAlreadyRunning,
}

/// Errors from starting the HTTP/WebSocket server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Reading the bound address failed.
    #[error("listener address unavailable: {0}")]
    LocalAddr(#[source] io::Error),

    /// The bridge refused to start.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
