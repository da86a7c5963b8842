//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup before
/// any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric names.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed for sending a malformed frame (counter, labels: reason).
pub const PROTOCOL_ERRORS_TOTAL: &str = "protocol_errors_total";
/// Requests submitted to the engine (counter).
pub const ENGINE_REQUESTS_TOTAL: &str = "engine_requests_total";
/// Messages received from the engine (counter).
pub const ENGINE_MESSAGES_TOTAL: &str = "engine_messages_total";
/// Engine messages dropped as unroutable: not a JSON object, or a bad `@client_id` (counter).
pub const ENGINE_INVALID_MESSAGES_TOTAL: &str = "engine_invalid_messages_total";
/// Messages dropped because a subscriber queue was full (counter).
pub const FANOUT_DROPS_TOTAL: &str = "fanout_drops_total";
/// Registered engine clients (gauge).
pub const ENGINE_CLIENTS: &str = "engine_clients";
