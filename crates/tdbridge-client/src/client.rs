//! `BridgeClient`: connection manager, correlator and inbound dispatch
//! behind one handle.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tdbridge_core::Envelope;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::correlator::RequestCorrelator;
use crate::errors::ClientError;
use crate::state::ConnectionState;

const UPDATE_CAPACITY: usize = 256;

/// A logical client of the bridge.
///
/// Must be created inside a Tokio runtime. Dropping the client stops it.
pub struct BridgeClient {
    manager: ConnectionManager,
    correlator: Arc<RequestCorrelator>,
    updates: broadcast::Sender<Envelope>,
    dispatcher: JoinHandle<()>,
}

impl BridgeClient {
    /// Create a stopped client. Nothing connects until [`start`](Self::start)
    /// or the first send.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let (manager, inbound) = ConnectionManager::new(&config)?;
        let correlator = Arc::new(RequestCorrelator::new(config.request_timeout));
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let dispatcher = tokio::spawn(dispatch_inbound(inbound, correlator.clone(), updates.clone()));
        Ok(Self {
            manager,
            correlator,
            updates,
            dispatcher,
        })
    }

    /// Connect. No-op while connecting or open.
    pub fn start(&self) {
        self.manager.start();
    }

    /// Disconnect without reconnecting. Outstanding requests fail with
    /// [`ClientError::Stopped`] and any of them still queued are never sent.
    ///
    /// Messages queued with [`send`](Self::send) stay queued for the next
    /// [`start`](Self::start).
    pub fn stop(&self) {
        self.manager.stop();
        let failed: HashSet<String> = self.correlator.fail_all().into_iter().collect();
        if failed.is_empty() {
            return;
        }
        let discarded = self.manager.discard_queued(|text| {
            Envelope::parse(text)
                .ok()
                .and_then(|queued| queued.request_id().map(|token| failed.contains(token)))
                .unwrap_or(false)
        });
        info!(failed = failed.len(), discarded, "failed outstanding requests on stop");
    }

    /// Send `request` and wait for the response carrying its correlation
    /// token.
    ///
    /// Existing `@extra` keys are kept; `requestId` is overwritten.
    pub async fn request(&self, request: Value) -> Result<Envelope, ClientError> {
        let envelope = Envelope::from_value(request)?;
        self.correlator
            .issue(envelope, |text| self.manager.send(text))
            .await
    }

    /// Send a message without waiting for a response.
    pub fn send(&self, message: Value) -> Result<(), ClientError> {
        let envelope = Envelope::from_value(message)?;
        self.manager.send(envelope.to_json());
        Ok(())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Messages no pending request claimed (updates and engine-wide events).
    pub fn subscribe_updates(&self) -> broadcast::Receiver<Envelope> {
        self.updates.subscribe()
    }

    /// Connection lifecycle events, including transport errors.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.manager.subscribe_events()
    }

    /// Requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.manager.stop();
        self.dispatcher.abort();
    }
}

async fn dispatch_inbound(
    mut inbound: mpsc::UnboundedReceiver<String>,
    correlator: Arc<RequestCorrelator>,
    updates: broadcast::Sender<Envelope>,
) {
    while let Some(text) = inbound.recv().await {
        let envelope = match Envelope::parse(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed message from server");
                continue;
            }
        };
        if let Some(unclaimed) = correlator.dispatch(envelope) {
            debug!(message_type = unclaimed.type_name().unwrap_or_default(), "update");
            let _ = updates.send(unclaimed);
        }
    }
}
