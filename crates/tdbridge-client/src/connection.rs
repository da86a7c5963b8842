//! Connection manager: one logical connection over successive transports.
//!
//! Lifecycle decisions come from [`transition`]. Each transport attempt
//! carries a generation number; `stop()` and every new attempt bump it, so
//! callbacks from an abandoned transport are recognized as stale and
//! ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::state::{Action, ConnectionState, Input, transition};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle notifications, including transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A transport attempt began.
    Connecting,
    /// The transport opened and the queue was flushed.
    Opened,
    /// The transport closed, with the peer's close code if it sent one.
    Closed {
        /// Close code from the close frame.
        code: Option<u16>,
    },
    /// The transport failed. A `Closed` event follows.
    TransportError(String),
}

struct Core {
    state: ConnectionState,
    generation: u64,
    queue: VecDeque<String>,
    writer: Option<mpsc::UnboundedSender<Message>>,
    task: Option<AbortHandle>,
}

struct Inner {
    url: Url,
    reconnect_delay: Duration,
    core: Mutex<Core>,
    inbound: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<ConnectionEvent>,
}

/// Owns the lifecycle of one logical connection.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a stopped manager. Inbound text frames arrive on the returned
    /// receiver in the order the server sent them.
    pub fn new(config: &ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<String>), ClientError> {
        let url = config.connect_url()?;
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            url,
            reconnect_delay: config.reconnect_delay,
            core: Mutex::new(Core {
                state: ConnectionState::Disconnected,
                generation: 0,
                queue: VecDeque::new(),
                writer: None,
                task: None,
            }),
            inbound,
            events,
        });
        Ok((Self { inner }, inbound_rx))
    }

    /// Connect if not already connecting or open.
    pub fn start(&self) {
        let mut core = self.inner.core.lock();
        Inner::start_locked(&self.inner, &mut core);
    }

    /// Close the connection with the normal close code and suppress
    /// reconnection. No-op when already disconnected.
    ///
    /// Queued messages stay queued for the next `start`; use
    /// [`discard_queued`](Self::discard_queued) to drop some first.
    pub fn stop(&self) {
        let mut core = self.inner.core.lock();
        let (next, action) = transition(core.state, Input::Stop);
        core.state = next;
        core.generation += 1;
        let writer = core.writer.take();
        let task = core.task.take();
        match action {
            Action::Close => {
                if let Some(writer) = writer {
                    let _ = writer.send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: Utf8Bytes::from_static("client stopped"),
                    })));
                }
            }
            Action::Abort => {
                if let Some(task) = task {
                    task.abort();
                }
            }
            _ => return,
        }
        info!(url = %self.inner.url, "connection stopped");
    }

    /// Send a text frame.
    ///
    /// Goes out immediately when open, otherwise joins the FIFO queue that
    /// is flushed on open. Sending while disconnected starts the connection.
    pub fn send(&self, text: String) {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        if core.state == ConnectionState::Open {
            if let Some(writer) = &core.writer {
                if let Err(mpsc::error::SendError(Message::Text(text))) =
                    writer.send(Message::Text(text.into()))
                {
                    // Driver is gone; its close callback will reconnect.
                    core.queue.push_back(text.as_str().to_owned());
                }
                return;
            }
        }
        core.queue.push_back(text);
        if core.state == ConnectionState::Disconnected {
            Inner::start_locked(&self.inner, core);
        }
    }

    /// Remove queued messages for which `discard` returns `true`.
    ///
    /// Returns how many were removed.
    pub fn discard_queued<F>(&self, mut discard: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut core = self.inner.core.lock();
        let before = core.queue.len();
        core.queue.retain(|text| !discard(text));
        before - core.queue.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// Messages waiting for the transport to open.
    pub fn queued(&self) -> usize {
        self.inner.core.lock().queue.len()
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn start_locked(this: &Arc<Self>, core: &mut Core) {
        let (next, action) = transition(core.state, Input::Start);
        core.state = next;
        if action == Action::Connect {
            core.generation += 1;
            Self::spawn_attempt(this, core);
        }
    }

    /// Launch a transport attempt for the current generation.
    fn spawn_attempt(this: &Arc<Self>, core: &mut Core) {
        let generation = core.generation;
        debug!(url = %this.url, generation, "connecting");
        this.emit(ConnectionEvent::Connecting);
        let task = tokio::spawn(drive(this.clone(), generation));
        core.task = Some(task.abort_handle());
    }

    /// Called by the driver once the handshake completes. Returns `false`
    /// when the attempt is stale and the transport should be discarded.
    fn on_open(&self, generation: u64, writer: mpsc::UnboundedSender<Message>) -> bool {
        let mut core = self.core.lock();
        if core.generation != generation {
            return false;
        }
        let (next, action) = transition(core.state, Input::TransportOpened);
        core.state = next;
        if action != Action::Drain {
            return false;
        }
        let queued = core.queue.len();
        // Drained under the lock so later sends cannot overtake the backlog.
        while let Some(text) = core.queue.pop_front() {
            if writer.send(Message::Text(text.into())).is_err() {
                break;
            }
        }
        core.writer = Some(writer);
        info!(url = %self.url, queued, "connection open");
        self.emit(ConnectionEvent::Opened);
        true
    }

    /// Called by the driver when its transport ends.
    fn on_closed(this: &Arc<Self>, generation: u64, code: Option<u16>) {
        let mut core = this.core.lock();
        if core.generation != generation {
            debug!(generation, "ignoring close from stale transport");
            return;
        }
        core.writer = None;
        core.task = None;
        let (next, action) = transition(core.state, Input::TransportClosed(code));
        core.state = next;
        if action != Action::Reconnect {
            info!(url = %this.url, ?code, "connection closed");
            return;
        }

        core.generation += 1;
        let retry = core.generation;
        warn!(url = %this.url, ?code, delay = ?this.reconnect_delay, "connection lost, reconnecting");
        let inner = this.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(inner.reconnect_delay).await;
            let mut core = inner.core.lock();
            if core.generation == retry && core.state == ConnectionState::Connecting {
                Self::spawn_attempt(&inner, &mut core);
            }
        });
    }
}

/// Run one transport from handshake to close.
#[instrument(skip(inner), fields(url = %inner.url))]
async fn drive(inner: Arc<Inner>, generation: u64) {
    let ws: WsStream = match connect_async(inner.url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(error = %e, "connect failed");
            inner.emit(ConnectionEvent::TransportError(e.to_string()));
            inner.emit(ConnectionEvent::Closed { code: None });
            Inner::on_closed(&inner, generation, None);
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (writer, mut outbound) = mpsc::unbounded_channel();
    if !inner.on_open(generation, writer) {
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Utf8Bytes::from_static("superseded"),
            })))
            .await;
        return;
    }

    let mut writer_open = true;
    let code = loop {
        tokio::select! {
            msg = outbound.recv(), if writer_open => {
                let Some(msg) = msg else {
                    writer_open = false;
                    continue;
                };
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(error = %e, "send failed");
                    inner.emit(ConnectionEvent::TransportError(e.to_string()));
                    break None;
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = inner.inbound.send(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(frame))) => break frame.map(|f| u16::from(f.code)),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "receive failed");
                    inner.emit(ConnectionEvent::TransportError(e.to_string()));
                    break None;
                }
                None => break None,
            }
        }
    };

    inner.emit(ConnectionEvent::Closed { code });
    Inner::on_closed(&inner, generation, code);
}
