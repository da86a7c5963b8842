//! One bridge instance: engine handle, client registry and fan-out.
//!
//! Nothing here is global, so several bridges can coexist in one process
//! (each over its own engine).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tdbridge_core::{ClientId, Engine};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::BridgeError;
use crate::fanout::Fanout;
use crate::metrics::ENGINE_REQUESTS_TOTAL;
use crate::poller::EnginePoller;
use crate::registry::ClientRegistry;

/// Shared state of a running bridge.
pub struct Bridge {
    engine: Arc<dyn Engine>,
    registry: ClientRegistry,
    fanout: Arc<Fanout>,
    poller_started: AtomicBool,
}

impl Bridge {
    /// Create a bridge over `engine`. The poll loop is not started.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            registry: ClientRegistry::new(engine.clone()),
            engine,
            fanout: Arc::new(Fanout::new()),
            poller_started: AtomicBool::new(false),
        }
    }

    /// Client key → client id table.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Publication fan-out fed by the poll loop.
    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Resolve `client_key` to its engine client id.
    pub fn resolve(&self, client_key: &str) -> ClientId {
        self.registry.resolve(client_key)
    }

    /// Forward a request verbatim to the engine.
    pub fn submit(&self, client_id: ClientId, request: &str) {
        counter!(ENGINE_REQUESTS_TOTAL).increment(1);
        debug!(client_id, len = request.len(), "submitting request to engine");
        self.engine.send(client_id, request);
    }

    /// Start the single engine poll loop.
    ///
    /// Fails with [`BridgeError::PollerAlreadyRunning`] on any later call, even
    /// after the first loop stopped: a second consumer would split the
    /// engine's message stream.
    pub fn spawn_poller(
        &self,
        max_receive_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, BridgeError> {
        if self.poller_started.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::PollerAlreadyRunning);
        }
        info!("starting engine poll loop");
        let poller = EnginePoller::new(self.engine.clone(), self.fanout.clone(), max_receive_interval);
        Ok(tokio::spawn(poller.run(cancel)))
    }

    /// Whether [`Bridge::spawn_poller`] has been called.
    pub fn poller_started(&self) -> bool {
        self.poller_started.load(Ordering::Acquire)
    }
}
