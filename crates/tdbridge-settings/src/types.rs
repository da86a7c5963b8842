//! Settings types. Every struct deserializes with defaults for missing keys.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Engine bootstrap settings.
    pub engine: EngineSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listener, poll loop and per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Upper bound on the poll loop's idle wait, in milliseconds.
    pub max_receive_interval_ms: u64,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for this long, in seconds.
    pub pong_timeout_secs: u64,
}

impl ServerSettings {
    /// `max_receive_interval_ms` as a [`Duration`].
    pub fn max_receive_interval(&self) -> Duration {
        Duration::from_millis(self.max_receive_interval_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            max_receive_interval_ms: 100,
            max_connections: 1024,
            outbound_buffer: 1024,
            heartbeat_interval_secs: 30,
            pong_timeout_secs: 90,
        }
    }
}

/// Engine bootstrap settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Whether to set the engine's own log verbosity at startup.
    pub set_log_verbosity: bool,
    /// Engine log verbosity (0 = fatal only, 5+ = debug).
    pub log_verbosity_level: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            set_log_verbosity: true,
            log_verbosity_level: 2,
        }
    }
}

/// Log output settings for the bridge itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
