//! Logical client key → engine client id table.
//!
//! Ids are created lazily on first use and never released: an engine client
//! id carries engine-side session state, so the mapping lives as long as the
//! bridge does.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tdbridge_core::{ClientId, Engine};
use tracing::info;

use crate::metrics::ENGINE_CLIENTS;

/// Maps client keys to engine client ids.
pub struct ClientRegistry {
    engine: Arc<dyn Engine>,
    ids: Mutex<HashMap<String, ClientId>>,
}

impl ClientRegistry {
    /// Create an empty registry backed by `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            ids: Mutex::new(HashMap::new()),
        }
    }

    /// Return the client id for `client_key`, creating it on first use.
    ///
    /// The engine is asked for an id while the table lock is held, so
    /// concurrent first resolutions of one key observe a single id.
    pub fn resolve(&self, client_key: &str) -> ClientId {
        let mut ids = self.ids.lock();
        if let Some(&id) = ids.get(client_key) {
            return id;
        }
        let id = self.engine.create_client_id();
        info!(client_key, client_id = id, "created engine client");
        let _ = ids.insert(client_key.to_string(), id);
        #[allow(clippy::cast_precision_loss)]
        gauge!(ENGINE_CLIENTS).set(ids.len() as f64);
        id
    }

    /// Look up an existing id without creating one.
    pub fn get(&self, client_key: &str) -> Option<ClientId> {
        self.ids.lock().get(client_key).copied()
    }

    /// Number of registered client keys.
    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    /// Whether no client has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}
