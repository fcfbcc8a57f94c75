//! # petlink-server
//!
//! Room relay for desktop-pet clients, served over Axum `WebSocket`s.
//!
//! - `WebSocket` gateway: one session task per connection, message dispatch
//! - Room registry: named, optionally password-gated rooms that live for the
//!   whole process
//! - Fan-out of `action` / `chat` events to the other members of a room
//! - Health and Prometheus endpoints, layered settings, `tracing` bootstrap
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod rooms;
pub mod server;
pub mod settings;
pub mod shutdown;
pub mod websocket;
