//! WebSocket connection handling: per-connection liveness, frame
//! classification and the session loop.

pub mod connection;
pub mod handler;
pub mod session;
