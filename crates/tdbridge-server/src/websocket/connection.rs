//! Per-connection state and the server-wide connection limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tdbridge_core::ClientId;

/// Counts open connections against a limit.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    next_id: AtomicU64,
}

impl ConnectionTracker {
    /// Create a tracker with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot if fewer than `max` are in use.
    pub fn try_acquire(self: &Arc<Self>, max: usize) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()?;
        Some(ConnectionSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            tracker: self.clone(),
        })
    }

    /// Connections currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// A reserved connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    id: u64,
    tracker: Arc<ConnectionTracker>,
}

impl ConnectionSlot {
    /// Server-unique connection number, for logs.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.tracker.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A connected logical client.
pub struct ClientConnection {
    /// Server-unique connection number.
    pub id: u64,
    /// Logical client key from the connect URL.
    pub client_key: String,
    /// Engine client id the key resolved to.
    pub client_id: ClientId,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
}

impl ClientConnection {
    /// Create a connection record.
    pub fn new(id: u64, client_key: String, client_id: ClientId) -> Self {
        let now = Instant::now();
        Self {
            id,
            client_key,
            client_id,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
        }
    }

    /// Record activity from the peer (any frame, including pongs).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the peer was last heard from.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the peer was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
