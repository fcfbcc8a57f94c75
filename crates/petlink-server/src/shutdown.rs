//! Shutdown coordination via `CancellationToken`.
//!
//! The listener and every connection session hold a child of the same token.
//! Cancelling it stops new accepts and makes each session close its socket
//! through the normal cleanup path, so room membership is released exactly
//! as on a client-initiated disconnect.
//!
//! Upgraded sessions run outside the listener task, so they are counted
//! separately in a [`TaskTracker`] that [`ShutdownCoordinator::drain`] waits on.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits when no timeout is given.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the process-wide shutdown token and the set of live sessions.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A child token for one task. Cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register one session. It counts as live until the token is dropped.
    pub fn track_session(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions registered and not yet finished.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel the token, then wait up to `timeout` for `handles` and every
    /// tracked session to finish.
    ///
    /// Listener tasks still running after the timeout are aborted.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let _ = self.sessions.close();
        info!(
            task_count = handles.len(),
            session_count = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to finish"
        );

        let aborters: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let finished = async {
            let _ = futures::future::join_all(handles).await;
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, finished).await.is_err() {
            warn!(
                sessions = self.sessions.len(),
                "shutdown timed out after {timeout:?}, aborting remaining tasks"
            );
            for aborter in aborters {
                aborter.abort();
            }
        }
    }
}
