//! # tdbridge-core
//!
//! Foundation types shared by the bridge server and client.
//!
//! - [`Envelope`]: the JSON message unit exchanged with the engine and clients
//! - [`Engine`]: the native engine collaborator (`create_client_id`/`send`/`receive`/`execute`)
//! - Close codes and logging setup used by both halves

#![deny(unsafe_code)]

pub mod constants;
pub mod engine;
pub mod envelope;
pub mod logging;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use engine::{ClientId, Engine, EngineError, set_log_verbosity};
pub use envelope::{Envelope, EnvelopeError};
