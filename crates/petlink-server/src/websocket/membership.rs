//! Scoped room membership for one connection.

use std::sync::Arc;

use tracing::debug;

use crate::rooms::{JoinError, RoomRegistry};
use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Ties a connection's room membership to the lifetime of its session.
///
/// The connection is `Unjoined` until [`Membership::join`] succeeds and
/// `Joined` afterwards. Dropping the guard removes the connection from its
/// room, whichever way the session ended.
pub struct Membership {
    registry: Arc<RoomRegistry>,
    connection: Arc<ClientConnection>,
}

impl Membership {
    /// Start tracking `connection`, initially outside any room.
    pub fn new(registry: Arc<RoomRegistry>, connection: Arc<ClientConnection>) -> Self {
        Self {
            registry,
            connection,
        }
    }

    /// The connection this guard belongs to.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// The shared registry.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Current room, `None` while unjoined.
    pub fn room(&self) -> Option<String> {
        self.connection.room()
    }

    /// Join `room_id`, leaving the current room first if it differs.
    ///
    /// On failure the connection keeps whatever membership it had.
    pub fn join(
        &self,
        room_id: &str,
        password: Option<&str>,
    ) -> Result<Vec<ConnectionId>, JoinError> {
        let previous = self.connection.room();
        let players =
            self.registry
                .join(room_id, password, &self.connection, previous.as_deref())?;
        self.connection.set_room(Some(room_id.to_owned()));
        Ok(players)
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if let Some(room) = self.connection.room() {
            let removed = self.registry.leave(&room, self.connection.id);
            self.connection.set_room(None);
            debug!(conn_id = %self.connection.id, room = %room, removed, "released room membership");
        }
    }
}
