//! Fan-out of engine messages to per-connection subscribers.
//!
//! Each subscriber is filtered by engine client id. Messages without a
//! `@client_id` are engine-wide and go to everyone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::RwLock;
use tdbridge_core::{ClientId, Envelope};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::metrics::{ENGINE_INVALID_MESSAGES_TOTAL, FANOUT_DROPS_TOTAL};

struct Subscriber {
    client_id: ClientId,
    tx: mpsc::Sender<Arc<str>>,
    dropped: Arc<AtomicU64>,
}

impl Subscriber {
    fn accepts(&self, target: Option<i64>) -> bool {
        target.is_none_or(|id| id == i64::from(self.client_id))
    }
}

/// Registry of active subscriptions.
pub struct Fanout {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl Fanout {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to messages for `client_id` plus engine-wide messages.
    ///
    /// Messages arrive on the returned receiver in publication order. The
    /// subscription ends when the [`Subscription`] is cancelled or dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        client_id: ClientId,
        capacity: usize,
    ) -> (Subscription, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));
        let _ = self.subscribers.write().insert(
            id,
            Subscriber {
                client_id,
                tx,
                dropped: dropped.clone(),
            },
        );
        debug!(subscription = id, client_id, "subscribed");

        let subscription = Subscription {
            id,
            fanout: Arc::downgrade(self),
            dropped,
            active: true,
        };
        (subscription, rx)
    }

    /// Deliver a raw engine message to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it. Messages that are
    /// not JSON objects, or whose `@client_id` is neither null nor an
    /// integer, are logged and dropped.
    pub fn publish(&self, raw: &str) -> usize {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed engine message");
                counter!(ENGINE_INVALID_MESSAGES_TOTAL).increment(1);
                return 0;
            }
        };
        let target = envelope.client_id();
        if target.is_none() && envelope.has_client_id() {
            warn!(
                message_type = envelope.type_name().unwrap_or_default(),
                "dropping engine message with a non-integer @client_id"
            );
            counter!(ENGINE_INVALID_MESSAGES_TOTAL).increment(1);
            return 0;
        }
        let message: Arc<str> = Arc::from(raw);

        // The read guard is the snapshot: subscribe/cancel wait for it.
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for (id, sub) in subscribers.iter().filter(|(_, s)| s.accepts(target)) {
            if sub.tx.try_send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                let _ = sub.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(FANOUT_DROPS_TOTAL).increment(1);
                warn!(subscription = id, client_id = sub.client_id, "subscriber queue full or closed, message dropped");
            }
        }
        trace!(
            message_type = envelope.type_name().unwrap_or_default(),
            client_id = target,
            delivered,
            "published engine message"
        );
        delivered
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn remove(&self, id: u64) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    fanout: Weak<Fanout>,
    dropped: Arc<AtomicU64>,
    active: bool,
}

impl Subscription {
    /// Stop receiving messages. Safe to call more than once.
    pub fn cancel(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(fanout) = self.fanout.upgrade() {
            if fanout.remove(self.id) {
                debug!(subscription = self.id, "unsubscribed");
            }
        }
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Messages dropped for this subscriber because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
