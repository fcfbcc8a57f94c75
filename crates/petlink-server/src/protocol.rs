//! Wire protocol: JSON objects tagged by a mandatory `type` field.
//!
//! Inbound frames decode into [`ClientEvent`]; replies produced by the server
//! encode from [`ServerMessage`]. Relayed `action` / `chat` frames are never
//! re-encoded, they are forwarded byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::rooms::RoomSummary;
use crate::websocket::connection::ConnectionId;

/// Reason reported in `join_failed` when the password does not match.
pub const WRONG_PASSWORD_REASON: &str = "wrong password";

/// An event sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Enter a room, creating it on first use.
    Join {
        /// Room identifier.
        room: String,
        /// Password; `null` and absent both mean "none supplied".
        #[serde(default)]
        password: Option<String>,
    },
    /// Ask for every room the process has seen.
    ListRooms,
    /// Pet animation trigger, relayed to room peers.
    Action,
    /// Chat line, relayed to room peers.
    Chat {
        /// Message body.
        text: String,
    },
    /// Any other `type` tag. Ignored by the dispatcher.
    #[serde(other)]
    Unknown,
}

impl ClientEvent {
    /// The wire tag of this event, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ListRooms => "list_rooms",
            Self::Action => "action",
            Self::Chat { .. } => "chat",
            Self::Unknown => "unknown",
        }
    }
}

/// A reply generated by the server for the requesting client only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Response to `list_rooms`.
    RoomList {
        /// One entry per room ever created.
        rooms: Vec<RoomSummary>,
    },
    /// A `join` was rejected.
    JoinFailed {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// Membership of the joined room, evaluated at join time.
    RoomPlayers {
        /// Connection identifiers of every member, the joiner included.
        players: Vec<ConnectionId>,
    },
}

impl ServerMessage {
    /// `join_failed` for a password mismatch.
    pub fn wrong_password() -> Self {
        Self::JoinFailed {
            reason: WRONG_PASSWORD_REASON.into(),
        }
    }
}

/// Errors that make an inbound frame unusable. Fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame is JSON, but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// The object is missing `type` or a field required by its type.
    #[error("invalid event: {0}")]
    InvalidEvent(#[source] serde_json::Error),
    /// A binary frame whose payload is not UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NonUtf8Binary,
}

/// Decode one inbound text frame.
pub fn parse_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject(json_kind(&value)));
    }
    ClientEvent::deserialize(value).map_err(ProtocolError::InvalidEvent)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
