//! Client error types.

use tdbridge_core::{Envelope, EnvelopeError};

/// Errors surfaced to callers of [`crate::BridgeClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured server address cannot be used.
    #[error("invalid server address {address:?}: {reason}")]
    InvalidUrl {
        /// Address as configured.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request is not a JSON object.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] EnvelopeError),

    /// No correlated response arrived in time.
    #[error("request {} timed out after {timeout_ms}ms", .request.type_name().unwrap_or("<untyped>"))]
    Timeout {
        /// The request as sent, including its correlation token.
        request: Envelope,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The client was stopped while the request was outstanding.
    #[error("client stopped before a response arrived")]
    Stopped,
}

impl ClientError {
    /// Whether this is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
