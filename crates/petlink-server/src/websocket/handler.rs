//! Message dispatch: parses an inbound frame as a [`ClientEvent`] and routes
//! it to the room registry or to a room broadcast.

use axum::extract::ws::{Message, Utf8Bytes};
use metrics::counter;
use tracing::{debug, info};

use crate::metrics::{RELAY_MESSAGES_TOTAL, ROOM_JOINS_TOTAL, ROOM_JOIN_FAILURES_TOTAL};
use crate::protocol::{ClientEvent, ProtocolError, ServerMessage, parse_event};
use crate::rooms::{JoinError, RelayOutcome};

use super::membership::Membership;

/// What a successfully parsed frame led to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Joined `room`; `players` members after the join.
    Joined {
        /// Room joined.
        room: String,
        /// Member count including the joiner.
        players: usize,
    },
    /// Join refused; membership unchanged.
    JoinRejected {
        /// Room that refused the join.
        room: String,
    },
    /// Room list sent with this many entries.
    Listed {
        /// Entries in the reply.
        rooms: usize,
    },
    /// Frame fanned out to room peers.
    Relayed(RelayOutcome),
    /// `action` / `chat` from a connection outside any room; dropped.
    NotInRoom,
    /// Unrecognised `type`; dropped.
    Ignored,
}

/// Handle one inbound text frame for the connection behind `membership`.
///
/// Replies are queued on the sender's connection; relayed frames are queued
/// on every other room member. A [`ProtocolError`] means the frame could not
/// be decoded and the caller must close the connection.
pub fn handle_message(
    raw: &Utf8Bytes,
    membership: &Membership,
) -> Result<HandleOutcome, ProtocolError> {
    let event = parse_event(raw.as_str())?;
    counter!(RELAY_MESSAGES_TOTAL, "type" => event.kind()).increment(1);

    let conn = membership.connection();
    let outcome = match event {
        ClientEvent::Join { room, password } => match membership.join(&room, password.as_deref()) {
            Ok(players) => {
                counter!(ROOM_JOINS_TOTAL).increment(1);
                info!(conn_id = %conn.id, room = %room, players = players.len(), "joined room");
                let count = players.len();
                let _ = conn.send_message(&ServerMessage::RoomPlayers { players });
                HandleOutcome::Joined {
                    room,
                    players: count,
                }
            }
            Err(e) => {
                counter!(ROOM_JOIN_FAILURES_TOTAL).increment(1);
                info!(conn_id = %conn.id, room = %room, reason = e.reason(), "join rejected");
                let reply = match e {
                    JoinError::WrongPassword => ServerMessage::wrong_password(),
                };
                let _ = conn.send_message(&reply);
                HandleOutcome::JoinRejected { room }
            }
        },
        ClientEvent::ListRooms => {
            let rooms = membership.registry().snapshot();
            let count = rooms.len();
            let _ = conn.send_message(&ServerMessage::RoomList { rooms });
            HandleOutcome::Listed { rooms: count }
        }
        ClientEvent::Action | ClientEvent::Chat { .. } => {
            if let Some(room) = conn.room() {
                let frame = Message::Text(raw.clone());
                let relayed = membership.registry().relay(&room, conn.id, &frame);
                debug!(
                    conn_id = %conn.id,
                    room = %room,
                    delivered = relayed.delivered,
                    dropped = relayed.dropped,
                    "relayed frame"
                );
                HandleOutcome::Relayed(relayed)
            } else {
                debug!(conn_id = %conn.id, "dropping event from connection outside any room");
                HandleOutcome::NotInRoom
            }
        }
        ClientEvent::Unknown => {
            debug!(conn_id = %conn.id, "ignoring event with unknown type");
            HandleOutcome::Ignored
        }
    };
    Ok(outcome)
}
