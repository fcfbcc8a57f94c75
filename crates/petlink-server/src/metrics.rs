//! Prometheus recorder and relay metric names.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed, for any reason (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram, seconds).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed for sending an undecodable frame (counter).
pub const WS_PROTOCOL_ERRORS_TOTAL: &str = "ws_protocol_errors_total";
/// Decoded inbound events (counter, label `type`).
pub const RELAY_MESSAGES_TOTAL: &str = "relay_messages_total";
/// Relayed frames a recipient's queue refused (counter).
pub const RELAY_DROPS_TOTAL: &str = "relay_drops_total";
/// Successful room joins (counter).
pub const ROOM_JOINS_TOTAL: &str = "room_joins_total";
/// Joins refused for a wrong password (counter).
pub const ROOM_JOIN_FAILURES_TOTAL: &str = "room_join_failures_total";

/// Install the global Prometheus recorder and describe the relay metrics.
///
/// Call once at start-up; the returned handle renders `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Attach help text to every relay metric on the installed recorder.
pub fn describe_metrics() {
    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections closed");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Open WebSocket connections");
    describe_histogram!(
        WS_CONNECTION_DURATION_SECONDS,
        Unit::Seconds,
        "WebSocket connection lifetime"
    );
    describe_counter!(
        WS_PROTOCOL_ERRORS_TOTAL,
        "Connections closed after an undecodable frame"
    );
    describe_counter!(RELAY_MESSAGES_TOTAL, "Inbound events by type");
    describe_counter!(RELAY_DROPS_TOTAL, "Relayed frames dropped on a full or closed queue");
    describe_counter!(ROOM_JOINS_TOTAL, "Successful room joins");
    describe_counter!(ROOM_JOIN_FAILURES_TOTAL, "Room joins refused");
}
