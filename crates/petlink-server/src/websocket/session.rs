//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_PROTOCOL_ERRORS_TOTAL,
};
use crate::protocol::ProtocolError;
use crate::rooms::RoomRegistry;

use super::connection::{ActiveConnection, ClientConnection};
use super::handler::handle_message;
use super::membership::Membership;

/// Close reason sent with code 1007 when a frame cannot be decoded.
pub const INVALID_PAYLOAD_REASON: &str = "invalid payload";

/// Close reason sent with code 1001 when the server stops.
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// How long teardown waits for the writer to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a session needs from the server.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Shared room registry.
    pub registry: Arc<RoomRegistry>,
    /// Outbound queue capacity for this connection.
    pub send_queue_capacity: usize,
    /// Keep-alive ping interval; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session for an accepted client.
///
/// 1. Spawns a writer that drains the outbound queue and sends keep-alive pings
/// 2. Dispatches inbound frames through [`handle_message`]
/// 3. Closes with 1007 on an undecodable frame, or 1001 on server shutdown,
///    through a control channel the writer flushes after queued frames
/// 4. Releases room membership on every exit path
#[instrument(skip_all, fields(conn_id = %active.id()))]
pub async fn run_ws_session(ws: WebSocket, active: ActiveConnection, ctx: SessionContext) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Message>(ctx.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(active.id(), send_tx));
    let membership = Membership::new(Arc::clone(&ctx.registry), Arc::clone(&connection));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (close_tx, close_rx) = oneshot::channel();
    let ping_interval = ctx.ping_interval.filter(|d| !d.is_zero());
    let mut writer = tokio::spawn(write_loop(ws_tx, send_rx, close_rx, ping_interval));

    let shutdown = ctx.shutdown;
    let (reason, close) = loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => {
                break ("server shutdown", Some(close_frame(close_code::AWAY, SHUTDOWN_REASON)));
            }
            frame = ws_rx.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            // Binary frames carrying UTF-8 are treated as text
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Utf8Bytes::from(text),
                Err(_) => break ("protocol error", Some(reject(&ProtocolError::NonUtf8Binary))),
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break ("client closed", None),
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break ("transport error", None);
            }
        };

        match handle_message(&text, &membership) {
            Ok(outcome) => debug!(?outcome, "handled frame"),
            Err(e) => break ("protocol error", Some(reject(&e))),
        }
    };

    match close {
        Some(frame) => {
            let _ = close_tx.send(frame);
        }
        None => drop(close_tx),
    }

    // Leave the room before the socket goes away so peers stop relaying to us.
    drop(membership);
    let dropped = connection.drop_count();
    let lifetime = connection.age();
    drop(connection);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        warn!("writer did not finish in {WRITER_DRAIN_TIMEOUT:?}, aborting");
        writer.abort();
    }

    info!(reason, dropped, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(lifetime.as_secs_f64());
    drop(active);
}

/// Drain the outbound queue into the socket until the session ends.
///
/// A frame on `close` is sent after whatever is already queued, without
/// passing through the bounded queue, so a full queue cannot swallow it.
async fn write_loop<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Message>,
    mut close: oneshot::Receiver<CloseFrame>,
    ping_interval: Option<Duration>,
) where
    S: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval(ping_interval.unwrap_or(Duration::from_secs(3600)));
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            // The close signal and queue end arrive together at teardown.
            biased;
            frame = &mut close => {
                if let Ok(frame) = frame {
                    while let Ok(msg) = send_rx.try_recv() {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                }
                break;
            }
            msg = send_rx.recv() => {
                let Some(msg) = msg else { break };
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick(), if ping_interval.is_some() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}

fn close_frame(code: u16, reason: &'static str) -> CloseFrame {
    CloseFrame {
        code,
        reason: reason.into(),
    }
}

/// Record a protocol error and build the 1007 close for it.
fn reject(error: &ProtocolError) -> CloseFrame {
    counter!(WS_PROTOCOL_ERRORS_TOTAL).increment(1);
    warn!(error = %error, "closing connection after protocol error");
    close_frame(close_code::INVALID, INVALID_PAYLOAD_REASON)
}
