//! Room registry: named rooms, their passwords and member connections.
//!
//! Rooms are created lazily by the first `join` and are never removed, even
//! after their last member leaves. Every access goes through one mutex, so a
//! reader never observes a half-applied join or leave.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::ws::Message;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::RELAY_DROPS_TOTAL;
use crate::protocol::WRONG_PASSWORD_REASON;
use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Why a join was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The room is protected and the supplied password does not match.
    #[error("wrong password")]
    WrongPassword,
}

impl JoinError {
    /// Reason string sent to the client in `join_failed`.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::WrongPassword => WRONG_PASSWORD_REASON,
        }
    }
}

/// One entry of a `room_list` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    /// Room identifier.
    pub room: String,
    /// Whether joining requires a password.
    pub has_password: bool,
    /// Current member count.
    pub player_count: usize,
}

/// Result of fanning a frame out to a room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients whose queue was full or closed.
    pub dropped: usize,
}

/// A single room.
#[derive(Debug, Default)]
pub struct Room {
    password: Option<String>,
    members: HashMap<ConnectionId, Arc<ClientConnection>>,
}

impl Room {
    /// Create an empty room. An empty or absent password leaves it open.
    pub fn new(password: Option<String>) -> Self {
        Self {
            password,
            members: HashMap::new(),
        }
    }

    /// Whether a non-empty password was stored at creation.
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Unprotected rooms accept any supplied value, wrong ones included.
    pub fn check_password(&self, supplied: Option<&str>) -> bool {
        match self.password.as_deref() {
            Some(stored) if !stored.is_empty() => supplied == Some(stored),
            _ => true,
        }
    }

    /// Insert a member. Re-adding an existing member is a no-op.
    pub fn add_member(&mut self, conn: Arc<ClientConnection>) {
        let _ = self.members.insert(conn.id, conn);
    }

    /// Remove a member. Returns `false` if it was not present.
    pub fn remove_member(&mut self, conn_id: ConnectionId) -> bool {
        self.members.remove(&conn_id).is_some()
    }

    /// Member ids in ascending order.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.members.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Unsynchronized room table. Always accessed through [`RoomRegistry`].
#[derive(Debug, Default)]
pub struct Rooms {
    rooms: BTreeMap<String, Room>,
}

impl Rooms {
    /// Return the room named `room_id`, creating it with `password` if it is
    /// unknown. The password is ignored for rooms that already exist.
    pub fn create_or_get(&mut self, room_id: &str, password: Option<&str>) -> &mut Room {
        self.rooms.entry(room_id.to_owned()).or_insert_with(|| {
            info!(room = room_id, protected = password.is_some_and(|p| !p.is_empty()), "room created");
            Room::new(password.map(str::to_owned))
        })
    }

    /// Look up an existing room.
    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Remove `conn_id` from `room_id`. The room itself is kept.
    pub fn remove_member(&mut self, room_id: &str, conn_id: ConnectionId) -> bool {
        self.rooms
            .get_mut(room_id)
            .is_some_and(|room| room.remove_member(conn_id))
    }

    /// Every room ever created, ordered by name.
    pub fn snapshot(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|(name, room)| RoomSummary {
                room: name.clone(),
                has_password: room.has_password(),
                player_count: room.len(),
            })
            .collect()
    }
}

/// Process-wide room registry, shared by every connection handler.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    inner: Mutex<Rooms>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `conn` to `room_id`, creating the room on first use.
    ///
    /// Password check, departure from `previous` and insertion happen under
    /// a single lock acquisition. On success returns every member id of the
    /// room, `conn` included. On failure membership is left untouched.
    pub fn join(
        &self,
        room_id: &str,
        password: Option<&str>,
        conn: &Arc<ClientConnection>,
        previous: Option<&str>,
    ) -> Result<Vec<ConnectionId>, JoinError> {
        let mut rooms = self.inner.lock();

        if !rooms.create_or_get(room_id, password).check_password(password) {
            debug!(conn_id = %conn.id, room = room_id, "join rejected: wrong password");
            return Err(JoinError::WrongPassword);
        }

        if let Some(previous) = previous.filter(|prev| *prev != room_id) {
            let _ = rooms.remove_member(previous, conn.id);
            debug!(conn_id = %conn.id, room = previous, "left room to join another");
        }

        let room = rooms.create_or_get(room_id, password);
        room.add_member(Arc::clone(conn));
        Ok(room.member_ids())
    }

    /// Remove `conn_id` from `room_id`. Returns `false` if it was not a member.
    pub fn leave(&self, room_id: &str, conn_id: ConnectionId) -> bool {
        self.inner.lock().remove_member(room_id, conn_id)
    }

    /// Queue `message` for every member of `room_id` except `sender`.
    ///
    /// Uses non-blocking sends; a recipient with a full or closed queue
    /// simply misses the frame.
    pub fn relay(&self, room_id: &str, sender: ConnectionId, message: &Message) -> RelayOutcome {
        let rooms = self.inner.lock();
        let Some(room) = rooms.get(room_id) else {
            return RelayOutcome::default();
        };

        let mut outcome = RelayOutcome::default();
        for (id, member) in &room.members {
            if *id == sender {
                continue;
            }
            if member.send(message.clone()) {
                outcome.delivered += 1;
            } else {
                outcome.dropped += 1;
                counter!(RELAY_DROPS_TOTAL).increment(1);
                warn!(conn_id = %id, room = room_id, "failed to queue relayed frame");
            }
        }
        outcome
    }

    /// Every room ever created, with password flag and member count.
    pub fn snapshot(&self) -> Vec<RoomSummary> {
        self.inner.lock().snapshot()
    }

    /// Member ids of `room_id`, or `None` if the room was never created.
    pub fn members(&self, room_id: &str) -> Option<Vec<ConnectionId>> {
        self.inner.lock().get(room_id).map(Room::member_ids)
    }

    /// Number of rooms ever created.
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection(id: u64) -> (Arc<ClientConnection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(ClientConnection::new(ConnectionId::from(id), tx)),
            rx,
        )
    }

    fn ids(raw: &[u64]) -> Vec<ConnectionId> {
        raw.iter().copied().map(ConnectionId::from).collect()
    }

    #[test]
    fn unprotected_room_accepts_anything() {
        let room = Room::new(None);
        assert!(!room.has_password());
        assert!(room.check_password(None));
        assert!(room.check_password(Some("")));
        assert!(room.check_password(Some("whatever")));
    }

    #[test]
    fn empty_password_means_unprotected() {
        let room = Room::new(Some(String::new()));
        assert!(!room.has_password());
        assert!(room.check_password(Some("x")));
    }

    #[test]
    fn protected_room_requires_exact_match() {
        let room = Room::new(Some("secret".into()));
        assert!(room.has_password());
        assert!(room.check_password(Some("secret")));
        assert!(!room.check_password(Some("Secret")));
        assert!(!room.check_password(Some("")));
        assert!(!room.check_password(None));
    }

    #[test]
    fn create_or_get_keeps_original_password() {
        let mut rooms = Rooms::default();
        let _ = rooms.create_or_get("r", Some("first"));
        let room = rooms.create_or_get("r", Some("second"));
        assert!(room.check_password(Some("first")));
        assert!(!room.check_password(Some("second")));
    }

    #[test]
    fn create_or_get_open_room_stays_open() {
        let mut rooms = Rooms::default();
        let _ = rooms.create_or_get("r", None);
        let room = rooms.create_or_get("r", Some("late"));
        assert!(!room.has_password());
        assert!(room.check_password(Some("anything")));
    }

    #[test]
    fn add_member_is_idempotent() {
        let (conn, _rx) = make_connection(1);
        let mut room = Room::new(None);
        room.add_member(conn.clone());
        room.add_member(conn);
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn remove_member_keeps_room() {
        let (conn, _rx) = make_connection(1);
        let mut rooms = Rooms::default();
        rooms.create_or_get("r", None).add_member(conn);
        assert!(rooms.remove_member("r", ConnectionId::from(1)));
        assert!(!rooms.remove_member("r", ConnectionId::from(1)));
        assert!(rooms.get("r").is_some_and(Room::is_empty));
    }

    #[test]
    fn remove_from_unknown_room() {
        let mut rooms = Rooms::default();
        assert!(!rooms.remove_member("nope", ConnectionId::from(1)));
        assert!(rooms.get("nope").is_none());
    }

    #[test]
    fn first_join_creates_room_with_only_joiner() {
        let registry = RoomRegistry::new();
        let (c1, _rx) = make_connection(1);
        let players = registry.join("room1", None, &c1, None).unwrap();
        assert_eq!(players, ids(&[1]));
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn join_open_room_with_any_password() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let _ = registry.join("room1", None, &c1, None).unwrap();
        let players = registry.join("room1", Some("x"), &c2, None).unwrap();
        assert_eq!(players, ids(&[1, 2]));
    }

    #[test]
    fn wrong_password_leaves_membership_unchanged() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let _ = registry.join("vault", Some("pw"), &c1, None).unwrap();

        let err = registry.join("vault", Some("nope"), &c2, None).unwrap_err();
        assert_eq!(err, JoinError::WrongPassword);
        assert_eq!(err.reason(), "wrong password");
        assert_eq!(registry.members("vault").unwrap(), ids(&[1]));

        // Retry with the right password succeeds.
        let players = registry.join("vault", Some("pw"), &c2, None).unwrap();
        assert_eq!(players, ids(&[1, 2]));
    }

    #[test]
    fn missing_password_rejected_for_protected_room() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let _ = registry.join("vault", Some("pw"), &c1, None).unwrap();
        assert!(registry.join("vault", None, &c2, None).is_err());
    }

    #[test]
    fn failed_join_keeps_previous_room() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let _ = registry.join("vault", Some("pw"), &c1, None).unwrap();
        let _ = registry.join("lobby", None, &c2, None).unwrap();

        assert!(registry.join("vault", Some("bad"), &c2, Some("lobby")).is_err());
        assert_eq!(registry.members("lobby").unwrap(), ids(&[2]));
    }

    #[test]
    fn switching_rooms_leaves_previous() {
        let registry = RoomRegistry::new();
        let (c1, _rx) = make_connection(1);
        let _ = registry.join("a", None, &c1, None).unwrap();
        let players = registry.join("b", None, &c1, Some("a")).unwrap();
        assert_eq!(players, ids(&[1]));
        assert!(registry.members("a").unwrap().is_empty());
        assert_eq!(registry.room_count(), 2);
    }

    #[test]
    fn rejoining_same_room_is_idempotent() {
        let registry = RoomRegistry::new();
        let (c1, _rx) = make_connection(1);
        let _ = registry.join("a", None, &c1, None).unwrap();
        let players = registry.join("a", None, &c1, Some("a")).unwrap();
        assert_eq!(players, ids(&[1]));
    }

    #[test]
    fn leave_keeps_room_listed() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let _ = registry.join("room1", None, &c1, None).unwrap();
        let _ = registry.join("room1", None, &c2, None).unwrap();

        assert!(registry.leave("room1", ConnectionId::from(1)));
        assert!(!registry.leave("room1", ConnectionId::from(1)));
        assert_eq!(registry.members("room1").unwrap(), ids(&[2]));

        assert!(registry.leave("room1", ConnectionId::from(2)));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].room, "room1");
        assert_eq!(snapshot[0].player_count, 0);
    }

    #[test]
    fn snapshot_lists_every_room_with_password_flag() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, _rx2) = make_connection(2);
        let (c3, _rx3) = make_connection(3);
        let _ = registry.join("open", None, &c1, None).unwrap();
        let _ = registry.join("locked", Some("pw"), &c2, None).unwrap();
        let _ = registry.join("blank", Some(""), &c3, None).unwrap();

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.iter().map(|s| s.room.as_str()).collect();
        assert_eq!(names, ["blank", "locked", "open"]);
        assert!(!snapshot[0].has_password);
        assert!(snapshot[1].has_password);
        assert!(!snapshot[2].has_password);
    }

    #[test]
    fn snapshot_of_empty_registry() {
        assert!(RoomRegistry::new().snapshot().is_empty());
    }

    #[test]
    fn relay_skips_sender() {
        let registry = RoomRegistry::new();
        let (c1, mut rx1) = make_connection(1);
        let (c2, mut rx2) = make_connection(2);
        let (c3, mut rx3) = make_connection(3);
        for c in [&c1, &c2, &c3] {
            let _ = registry.join("room1", None, c, None).unwrap();
        }

        let frame = Message::Text(r#"{"type":"action"}"#.into());
        let outcome = registry.relay("room1", c1.id, &frame);
        assert_eq!(outcome, RelayOutcome { delivered: 2, dropped: 0 });

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
    }

    #[test]
    fn relay_stays_inside_room() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, mut rx2) = make_connection(2);
        let (c3, mut rx3) = make_connection(3);
        let _ = registry.join("a", None, &c1, None).unwrap();
        let _ = registry.join("a", None, &c2, None).unwrap();
        let _ = registry.join("b", None, &c3, None).unwrap();

        let frame = Message::Text(r#"{"type":"chat","text":"hi"}"#.into());
        let _ = registry.relay("a", c1.id, &frame);
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn relay_counts_drops_for_closed_recipients() {
        let registry = RoomRegistry::new();
        let (c1, _rx1) = make_connection(1);
        let (c2, rx2) = make_connection(2);
        let _ = registry.join("room1", None, &c1, None).unwrap();
        let _ = registry.join("room1", None, &c2, None).unwrap();
        drop(rx2);

        let frame = Message::Text(r#"{"type":"action"}"#.into());
        let outcome = registry.relay("room1", c1.id, &frame);
        assert_eq!(outcome, RelayOutcome { delivered: 0, dropped: 1 });
        assert_eq!(c2.drop_count(), 1);
    }

    #[test]
    fn relay_to_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        let frame = Message::Text(r#"{"type":"action"}"#.into());
        let outcome = registry.relay("ghost", ConnectionId::from(1), &frame);
        assert_eq!(outcome, RelayOutcome::default());
    }

    #[test]
    fn relay_alone_in_room_delivers_nothing() {
        let registry = RoomRegistry::new();
        let (c1, mut rx1) = make_connection(1);
        let _ = registry.join("solo", None, &c1, None).unwrap();
        let frame = Message::Text(r#"{"type":"action"}"#.into());
        assert_eq!(registry.relay("solo", c1.id, &frame).delivered, 0);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn concurrent_joins_all_land() {
        let registry = Arc::new(RoomRegistry::new());
        let handles: Vec<_> = (1..=16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let (conn, _rx) = make_connection(i);
                    let _ = registry.join("crowd", None, &conn, None).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.members("crowd").unwrap().len(), 16);
    }
}
