//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::rooms::RoomRegistry;
use crate::websocket::connection::ConnectionTracker;

/// Liveness snapshot of the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the process is serving.
    pub status: &'static str,
    /// Whole seconds since start-up.
    pub uptime_secs: u64,
    /// Open WebSocket connections, joined or not.
    pub connections: usize,
    /// Rooms created since start-up, empty ones included.
    pub rooms: usize,
    /// Connections currently inside a room.
    pub players: usize,
}

impl HealthResponse {
    /// Read live counters from the tracker and registry.
    pub fn collect(
        start_time: Instant,
        tracker: &ConnectionTracker,
        registry: &RoomRegistry,
    ) -> Self {
        let rooms = registry.snapshot();
        Self {
            status: "ok",
            uptime_secs: start_time.elapsed().as_secs(),
            connections: tracker.active(),
            rooms: rooms.len(),
            players: rooms.iter().map(|r| r.player_count).sum(),
        }
    }
}
