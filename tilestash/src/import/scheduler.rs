//! Background task scheduler for import conversions.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Runs detached import work and coordinates its shutdown.
///
/// Every task spawned here can observe [`shutdown_token`](Self::shutdown_token);
/// [`shutdown`](Self::shutdown) cancels the token and waits for the tasks to
/// finalize their records.
#[derive(Debug, Clone)]
pub struct ImportScheduler {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl ImportScheduler {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawns `task` on the runtime and tracks it until completion.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Token cancelled when the scheduler shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of tasks still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for all tasks spawned so far to finish, without cancelling them.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancels running imports and waits up to `grace` for them to finish.
    ///
    /// Returns false if tasks were still running when the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let running = self.tracker.len();
        info!(running, "Shutting down import scheduler");

        self.shutdown.cancel();
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("Import scheduler stopped");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    grace_ms = grace.as_millis(),
                    "Imports still running after shutdown grace period"
                );
                false
            }
        }
    }
}

impl Default for ImportScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let scheduler = ImportScheduler::new();
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let finished = Arc::clone(&finished);
            scheduler.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        scheduler.drain().await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.running(), 0);
        assert!(!scheduler.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_tasks() {
        let scheduler = ImportScheduler::new();
        let token = scheduler.shutdown_token();
        let handle = scheduler.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => "cancelled",
                _ = tokio::time::sleep(Duration::from_secs(60)) => "slept",
            }
        });

        assert!(scheduler.shutdown(Duration::from_secs(5)).await);
        assert_eq!(handle.await.unwrap(), "cancelled");
    }

    #[tokio::test]
    async fn test_shutdown_reports_stragglers() {
        let scheduler = ImportScheduler::new();
        scheduler.spawn(tokio::time::sleep(Duration::from_secs(60)));
        assert!(!scheduler.shutdown(Duration::from_millis(20)).await);
    }
}
