//! WebSocket session lifecycle: one logical connection from upgrade to
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tdbridge_core::constants::{CLOSE_GOING_AWAY, CLOSE_POLICY};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{FrameOutcome, classify};
use crate::bridge::Bridge;
use crate::metrics::{
    PROTOCOL_ERRORS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Shortest ping period a session will use; smaller values are raised to it.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Per-connection tunables.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Outbound queue capacity.
    pub outbound_buffer: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Disconnect after this long without hearing from the peer.
    pub pong_timeout: Duration,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    PeerClosed,
    TransportError,
    ProtocolError,
    Unresponsive,
    Shutdown,
    SendFailed,
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Run a session for one connected logical client.
///
/// Resolves the key to an engine client id, subscribes to engine output for
/// that id, then forwards in both directions until either side closes,
/// the peer stops answering pings, or `cancel` fires. The subscription is
/// removed on every exit path.
#[instrument(skip_all, fields(connection = connection_id, client_key = %client_key))]
pub async fn run_client_session(
    ws: WebSocket,
    connection_id: u64,
    client_key: String,
    bridge: Arc<Bridge>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let client_id = bridge.resolve(&client_key);
    let connection = ClientConnection::new(connection_id, client_key, client_id);
    let (mut subscription, mut outbound) = bridge.fanout().subscribe(client_id, config.outbound_buffer);
    let (mut ws_tx, mut ws_rx) = ws.split();

    info!(client_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut ping = tokio::time::interval(config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL));
    // The first tick fires immediately.
    let _ = ping.tick().await;

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(close_message(CLOSE_GOING_AWAY, "server shutting down")).await;
                break EndReason::Shutdown;
            }
            msg = outbound.recv() => {
                let Some(text) = msg else {
                    break EndReason::Shutdown;
                };
                if ws_tx.send(Message::Text(String::from(&*text).into())).await.is_err() {
                    break EndReason::SendFailed;
                }
            }
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break EndReason::TransportError;
                    }
                    None => break EndReason::PeerClosed,
                };
                connection.mark_alive();
                match classify(&frame) {
                    FrameOutcome::Forward(text) => bridge.submit(client_id, &text),
                    FrameOutcome::Close { code, reason } => {
                        warn!(code, reason, "protocol error, closing connection");
                        counter!(PROTOCOL_ERRORS_TOTAL, "reason" => reason).increment(1);
                        let _ = ws_tx.send(close_message(code, reason)).await;
                        break EndReason::ProtocolError;
                    }
                    FrameOutcome::Closed => break EndReason::PeerClosed,
                    FrameOutcome::Ignore => {}
                }
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_seen_elapsed() > config.pong_timeout {
                    warn!(timeout = ?config.pong_timeout, "client unresponsive, disconnecting");
                    let _ = ws_tx.send(close_message(CLOSE_POLICY, "ping timeout")).await;
                    break EndReason::Unresponsive;
                }
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break EndReason::SendFailed;
                }
            }
        }
    };

    subscription.cancel();
    let dropped = subscription.dropped();
    info!(client_id, ?reason, dropped, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
