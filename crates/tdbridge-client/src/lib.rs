//! # tdbridge-client
//!
//! Client side of the bridge.
//!
//! - [`ConnectionManager`]: connect, queue while connecting, reconnect on
//!   unexpected close, explicit stop
//! - [`RequestCorrelator`]: match responses to requests by `@extra.requestId`
//! - [`BridgeClient`]: both, plus routing of unclaimed messages to update
//!   subscribers

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod errors;
pub mod state;

pub use client::BridgeClient;
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionManager};
pub use correlator::RequestCorrelator;
pub use errors::ClientError;
pub use state::ConnectionState;
