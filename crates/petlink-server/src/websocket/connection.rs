//! WebSocket client connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Server-assigned connection identifier, unique for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues connection ids and counts live connections.
#[derive(Debug)]
pub struct ConnectionTracker {
    next_id: AtomicU64,
    active: AtomicUsize,
}

impl ConnectionTracker {
    /// Create a tracker whose first id is `1`.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
        }
    }

    /// Register a newly accepted connection.
    ///
    /// The returned guard keeps the connection counted as active until it is
    /// dropped.
    pub fn open(self: &Arc<Self>) -> ActiveConnection {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.active.fetch_add(1, Ordering::Relaxed);
        ActiveConnection {
            id,
            tracker: Arc::clone(self),
        }
    }

    /// Number of connections currently open.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Accounting guard for one open connection.
#[derive(Debug)]
pub struct ActiveConnection {
    id: ConnectionId,
    tracker: Arc<ConnectionTracker>,
}

impl ActiveConnection {
    /// Id assigned at accept time.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        let _ = self.tracker.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Room this connection currently belongs to.
    room: Mutex<Option<String>>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Message>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            room: Mutex::new(None),
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Record the room this connection has joined.
    pub fn set_room(&self, room: Option<String>) {
        *self.room.lock() = room;
    }

    /// The room this connection has joined, if any.
    pub fn room(&self) -> Option<String> {
        self.room.lock().clone()
    }

    /// Queue a frame for the client.
    ///
    /// Never waits: returns `false` if the channel is full or closed, and
    /// increments the dropped message counter.
    pub fn send(&self, message: Message) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a server reply and queue it for the client.
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(conn_id = %self.id, error = %e, "failed to serialize reply");
                false
            }
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("room", &self.room())
            .finish_non_exhaustive()
    }
}
