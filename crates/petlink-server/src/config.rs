//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8765`, `0` to auto-assign).
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between keep-alive Ping frames, in seconds. `0` disables pings.
    pub ping_interval_secs: u64,
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8765,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024, // 64 KiB
            ping_interval_secs: 30,
        }
    }
}
