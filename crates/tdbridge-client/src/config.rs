//! Client configuration.

use std::time::Duration;

use tdbridge_core::constants::CLIENT_KEY_PARAM;
use url::Url;

use crate::errors::ClientError;

/// Default time to wait for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause before reconnecting after an unexpected close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Where and as whom to connect.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base WebSocket address, e.g. `ws://localhost:3000`.
    pub server_address: String,
    /// Logical client key; connections with the same key share an engine client.
    pub client_key: String,
    /// How long [`crate::BridgeClient::request`] waits for a response.
    pub request_timeout: Duration,
    /// Pause before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Config with default timeouts.
    pub fn new(server_address: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            client_key: client_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// The address with `clientKey` appended to its query.
    pub fn connect_url(&self) -> Result<Url, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            address: self.server_address.clone(),
            reason,
        };
        let mut url = Url::parse(&self.server_address).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let _ = url
            .query_pairs_mut()
            .append_pair(CLIENT_KEY_PARAM, &self.client_key);
        Ok(url)
    }
}
