use std::time::Duration;

use tokio::sync::watch;

/// Bounded exponential backoff for transient pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts failures so far (from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// True once shutdown has been requested or the controlling sender is gone.
pub(crate) fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    let stop = *shutdown.borrow();
    stop || shutdown.has_changed().is_err()
}

/// Resolves when shutdown is requested. A dropped sender counts as a request.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleep for `delay` unless shutdown arrives first. Returns `false` when interrupted.
pub(crate) async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if shutdown_requested(shutdown) {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = wait_for_shutdown(shutdown) => false,
    }
}
