//! Graceful shutdown with a deadline (§4.8). Cancelling the shared
//! context tells every in-flight handler to wind down via its stream's
//! `context()`; the `TaskTracker` lets the coordinator wait for them to
//! actually finish, instead of guessing how long that takes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tracks every spawned connection/handler task and the cancellation
/// context they all share. One per listening server.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    ct: CancellationToken,
    tracker: TaskTracker,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self {
            ct: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.ct.clone()
    }

    #[must_use]
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Request shutdown: cancel the shared context, stop accepting new
    /// tracked tasks, and wait up to `deadline` for outstanding work to
    /// drain (§4.8 steps 1-3). Work still running past the deadline is
    /// abandoned, not killed — tasks observe cancellation cooperatively.
    pub async fn shutdown(self, deadline: Duration) {
        self.ct.cancel();
        self.tracker.close();
        if tokio::time::timeout(deadline, self.tracker.wait()).await.is_err() {
            log::warn!("graceful shutdown deadline of {deadline:?} elapsed with handlers still outstanding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_waits_for_tracked_tasks_within_deadline() {
        let coordinator = ShutdownCoordinator::new();
        let ct = coordinator.token();
        coordinator.tracker().spawn(async move {
            ct.cancelled().await;
        });

        coordinator.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_logs_and_returns_after_deadline_elapses() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.tracker().spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        coordinator.shutdown(Duration::from_millis(10)).await;
    }
}
