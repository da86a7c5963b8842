//! In-process engine double for tests.
//!
//! [`MemoryEngine`] hands out sequential client ids, records every `send`,
//! and queues canned responses that [`Engine::receive`] pops in FIFO order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::constants::{CLIENT_ID_KEY, EXTRA_KEY, TYPE_KEY};
use crate::engine::{ClientId, Engine};

/// How the engine answers a submitted request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Responder {
    /// Answer `getAuthorizationState` with `authorizationStateWaitTdlibParameters`
    /// and anything else with an `error` envelope.
    Auth,
    /// Never answer.
    Silent,
}

/// Engine double backed by in-memory queues.
pub struct MemoryEngine {
    responder: Responder,
    next_client_id: AtomicI32,
    created: AtomicUsize,
    outbox: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<(ClientId, String)>>,
}

impl MemoryEngine {
    /// Engine that answers authorization-state queries.
    pub fn new() -> Self {
        Self::with_responder(Responder::Auth)
    }

    /// Engine that never answers submitted requests.
    pub fn silent() -> Self {
        Self::with_responder(Responder::Silent)
    }

    /// Engine with an explicit answering policy.
    pub fn with_responder(responder: Responder) -> Self {
        Self {
            responder,
            next_client_id: AtomicI32::new(1),
            created: AtomicUsize::new(0),
            outbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw message for the next `receive`.
    pub fn push(&self, raw: impl Into<String>) {
        self.outbox.lock().push_back(raw.into());
    }

    /// How many times `create_client_id` was called.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Everything submitted through `send`, in order.
    pub fn sent(&self) -> Vec<(ClientId, String)> {
        self.sent.lock().clone()
    }

    /// Number of messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.outbox.lock().len()
    }

    fn answer(client_id: ClientId, request: &Value) -> Value {
        let extra = request.get(EXTRA_KEY).cloned().unwrap_or(Value::Null);
        let mut response = match request.get(TYPE_KEY).and_then(Value::as_str) {
            Some("getAuthorizationState") => json!({
                "@type": "authorizationStateWaitTdlibParameters",
            }),
            other => json!({
                "@type": "error",
                "code": 400,
                "message": format!("unsupported request {}", other.unwrap_or("<none>")),
            }),
        };
        response[CLIENT_ID_KEY] = json!(client_id);
        if !extra.is_null() {
            response[EXTRA_KEY] = extra;
        }
        response
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn create_client_id(&self) -> ClientId {
        let _ = self.created.fetch_add(1, Ordering::SeqCst);
        self.next_client_id.fetch_add(1, Ordering::SeqCst)
    }

    fn send(&self, client_id: ClientId, request: &str) {
        self.sent.lock().push((client_id, request.to_string()));
        if self.responder == Responder::Silent {
            return;
        }
        if let Ok(value) = serde_json::from_str::<Value>(request) {
            self.push(Self::answer(client_id, &value).to_string());
        }
    }

    fn receive(&self, _timeout: Duration) -> Option<String> {
        self.outbox.lock().pop_front()
    }

    fn execute(&self, request: &str) -> Option<String> {
        let value: Value = serde_json::from_str(request).ok()?;
        match value.get(TYPE_KEY).and_then(Value::as_str) {
            Some("setLogVerbosityLevel") => Some(json!({"@type": "ok"}).to_string()),
            _ => Some(json!({"@type": "error", "code": 400}).to_string()),
        }
    }
}
