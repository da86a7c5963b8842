//! `BridgeServer`: axum HTTP + WebSocket front end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tdbridge_core::constants::CLIENT_KEY_PARAM;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ConnectionTracker;
use crate::websocket::session::{SessionConfig, run_client_session};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bridge every connection multiplexes onto.
    pub bridge: Arc<Bridge>,
    /// Open connection counter.
    pub connections: Arc<ConnectionTracker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
    /// Connection limit.
    pub max_connections: usize,
    /// Per-session tunables.
    pub session: SessionConfig,
}

/// The bridge server.
pub struct BridgeServer {
    config: ServerConfig,
    bridge: Arc<Bridge>,
    connections: Arc<ConnectionTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl BridgeServer {
    /// Create a server over `bridge`.
    pub fn new(config: ServerConfig, bridge: Arc<Bridge>, metrics: PrometheusHandle) -> Self {
        Self {
            config,
            bridge,
            connections: Arc::new(ConnectionTracker::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router.
    ///
    /// `/health` and `/metrics` are plain HTTP; every other path upgrades to
    /// a bridge WebSocket.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: self.bridge.clone(),
            connections: self.connections.clone(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            max_connections: self.config.max_connections,
            session: SessionConfig {
                outbound_buffer: self.config.outbound_buffer,
                heartbeat_interval: self.config.heartbeat_interval,
                pong_timeout: self.config.pong_timeout,
            },
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(ws_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind, start the engine poll loop and serve until shutdown.
    ///
    /// Returns the bound address and the serving task. The task finishes
    /// after [`ShutdownCoordinator::shutdown`] once the poll loop has stopped.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let token = self.shutdown.token();
        let poller = self
            .bridge
            .spawn_poller(self.config.max_receive_interval, token.clone())?;
        let app = self.router();

        info!(%local, "bridge server listening");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            if let Err(e) = poller.await {
                error!(error = %e, "engine poll loop panicked");
            }
            info!("bridge server stopped");
        });
        Ok((local, handle))
    }

    /// The bridge this server fronts.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.active()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.active(),
        state.bridge.registry().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Any other path: upgrade to a bridge session keyed by `clientKey`.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(client_key) = params.get(CLIENT_KEY_PARAM).filter(|k| !k.is_empty()).cloned() else {
        debug!("rejecting connection without client key");
        return (StatusCode::BAD_REQUEST, "No client key").into_response();
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(client_key, %rejection, "rejecting non-websocket request");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };
    let Some(slot) = state.connections.try_acquire(state.max_connections) else {
        warn!(client_key, limit = state.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let cancel = state.shutdown.token();
    upgrade.on_upgrade(move |socket| async move {
        run_client_session(socket, slot.id(), client_key, state.bridge, state.session, cancel).await;
        drop(slot);
    })
}
