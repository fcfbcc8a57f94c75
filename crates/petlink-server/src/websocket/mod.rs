//! WebSocket connection state, room membership, message dispatch, and the
//! per-client session loop.

pub mod connection;
pub mod handler;
pub mod membership;
pub mod session;
