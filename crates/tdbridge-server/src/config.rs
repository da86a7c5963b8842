//! Server configuration.

use std::time::Duration;

use tdbridge_settings::ServerSettings;

/// Runtime configuration for [`crate::server::BridgeServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Cap on the poll loop's idle wait.
    pub max_receive_interval: Duration,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Disconnect a client that has been silent this long.
    pub pong_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` as given, for binding and logging.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_receive_interval: Duration::from_millis(100),
            max_connections: 1024,
            outbound_buffer: 1024,
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(90),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_receive_interval: settings.max_receive_interval(),
            max_connections: settings.max_connections,
            outbound_buffer: settings.outbound_buffer,
            // A zero period would make every session's ping timer panic.
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(settings.pong_timeout_secs),
        }
    }
}
