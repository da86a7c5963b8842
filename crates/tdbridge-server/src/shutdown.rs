//! Bridge-wide stop signal.
//!
//! One token reaches three places. The axum listener stops accepting and
//! drains. The engine poll loop exits at its next wait. Every client session
//! sends close 1001 to its peer and drops its fan-out subscription. The
//! serving task returned by `BridgeServer::listen` completes only after all
//! of this, so awaiting it is how the binary knows the bridge is down.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long the binary waits for the serving task by default.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`ShutdownCoordinator::graceful_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Tasks that finished on their own within the timeout.
    pub finished: usize,
    /// Tasks that were still running and got aborted.
    pub aborted: usize,
}

/// Owns the stop token shared by the listener, the poll loop and sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token for one more participant (a session or the poll loop).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the stop signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the stop signal has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the stop signal, then give `handles` up to `timeout`
    /// (10 s when `None`) to finish. Anything still running is aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), timeout_ms = timeout.as_millis(), "stopping bridge");

        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ShutdownReport::default();
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_ok() {
                report.finished += 1;
            } else {
                handle.abort();
                report.aborted += 1;
            }
        }
        if report.aborted > 0 {
            warn!(aborted = report.aborted, ?timeout, "bridge tasks did not stop in time");
        }
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn every_participant_sees_the_signal() {
        let coord = ShutdownCoordinator::new();
        let poller = coord.token();
        let session = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(poller.is_cancelled());
        assert!(session.is_cancelled());
    }

    #[tokio::test]
    async fn cooperative_tasks_finish() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move { token.cancelled().await });
        let report = coord.graceful_shutdown(vec![handle], None).await;
        assert_eq!(report, ShutdownReport { finished: 1, aborted: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_aborted_at_deadline() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let cooperative = tokio::spawn(async move { token.cancelled().await });
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let stuck = tokio::spawn(async move {
            let _guard = tx;
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let report = coord
            .graceful_shutdown(vec![cooperative, stuck], Some(Duration::from_millis(100)))
            .await;
        assert_eq!(report, ShutdownReport { finished: 1, aborted: 1 });
        // The aborted task dropped its sender.
        assert!(rx.await.is_err());
    }
}
