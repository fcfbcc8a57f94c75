//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::HealthResponse;
use crate::rooms::RoomRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ConnectionTracker;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Errors from starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bound listener did not report a local address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Room registry shared by every session.
    pub registry: Arc<RoomRegistry>,
    /// Connection id issuer and live counter.
    pub tracker: Arc<ConnectionTracker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<RoomRegistry>,
    tracker: Arc<ConnectionTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a new server with an empty room registry.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RoomRegistry::new()),
            tracker: Arc::new(ConnectionTracker::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            tracker: Arc::clone(&self.tracker),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful when port `0` was requested) and the
    /// serve task handle, which completes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%local_addr, "relay server listening");
        Ok((local_addr, handle))
    }

    /// Get the room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the connection tracker.
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET `/` and `/ws`: upgrade to a relay session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let ctx = SessionContext {
        registry: Arc::clone(&state.registry),
        send_queue_capacity: state.config.send_queue_capacity,
        ping_interval: (state.config.ping_interval_secs > 0)
            .then(|| Duration::from_secs(state.config.ping_interval_secs)),
        shutdown: state.shutdown.token(),
    };
    // Ids follow handshake order; both guards are released if the upgrade fails.
    let active = state.tracker.open();
    let tracked = state.shutdown.track_session();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, active, ctx).await;
            drop(tracked);
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::collect(
        state.start_time,
        &state.tracker,
        &state.registry,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
