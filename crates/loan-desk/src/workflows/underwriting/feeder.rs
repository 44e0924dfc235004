use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::domain::{Loan, LoanStatus};
use super::error::LendingError;
use super::repository::{ClaimOutcome, LendingRepository};
use super::retry::{shutdown_requested, wait_for_shutdown};

/// Periodic producer that claims `Applied` loans and hands them to the worker pool.
pub struct JobFeeder<R> {
    repository: Arc<R>,
    interval: Duration,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedTick {
    pub discovered: usize,
    pub claimed: usize,
    pub conflicts: usize,
}

enum Feed {
    Continue(FeedTick),
    Stopped(FeedTick),
    QueueClosed(FeedTick),
}

impl<R> JobFeeder<R>
where
    R: LendingRepository + 'static,
{
    pub fn new(repository: Arc<R>, interval: Duration) -> Self {
        Self {
            repository,
            interval,
        }
    }

    /// Tick until shutdown, then drop `queue` so workers drain and exit.
    /// Returns the number of loans enqueued.
    pub async fn run(
        self,
        queue: mpsc::Sender<Loan>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut enqueued = 0;

        loop {
            let ticked = tokio::select! {
                _ = ticker.tick() => true,
                _ = wait_for_shutdown(&mut shutdown) => false,
            };
            if !ticked {
                info!("shutdown signal, stopping job feeder");
                break;
            }

            match self.feed_once(&queue, &mut shutdown).await {
                Ok(Feed::Continue(tick)) => {
                    enqueued += tick.claimed;
                    if tick.claimed > 0 || tick.conflicts > 0 {
                        debug!(
                            discovered = tick.discovered,
                            claimed = tick.claimed,
                            conflicts = tick.conflicts,
                            "feeder tick"
                        );
                    }
                }
                Ok(Feed::Stopped(tick)) => {
                    enqueued += tick.claimed;
                    info!("shutdown signal mid-tick, stopping job feeder");
                    break;
                }
                Ok(Feed::QueueClosed(tick)) => {
                    enqueued += tick.claimed;
                    warn!("worker queue closed, stopping job feeder");
                    break;
                }
                Err(err) => warn!(error = %err, "feeder tick failed"),
            }
        }

        drop(queue);
        enqueued
    }

    /// Claim every `Applied` loan and push it onto the queue, waiting when the queue is full.
    /// Shutdown is checked before each claim and while waiting for queue capacity. A loan that
    /// is already claimed is still delivered, since the workers keep draining after shutdown.
    async fn feed_once(
        &self,
        queue: &mpsc::Sender<Loan>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Feed, LendingError> {
        let applied = self.repository.list_loans_by_status(LoanStatus::Applied)?;
        let mut tick = FeedTick {
            discovered: applied.len(),
            ..FeedTick::default()
        };

        for loan in applied {
            if shutdown_requested(shutdown) {
                return Ok(Feed::Stopped(tick));
            }

            let outcome =
                self.repository
                    .claim_loan(loan.id, LoanStatus::Applied, LoanStatus::Processing);
            let claimed = match outcome {
                Ok(ClaimOutcome::Claimed(claimed)) => claimed,
                Ok(ClaimOutcome::Conflict) => {
                    tick.conflicts += 1;
                    continue;
                }
                Err(err) => {
                    warn!(loan_id = %loan.id, error = %err, "failed to claim loan");
                    continue;
                }
            };

            let loan_id = claimed.id;
            let mut stopping = false;
            let permit = tokio::select! {
                permit = queue.reserve() => permit,
                _ = wait_for_shutdown(shutdown) => {
                    debug!(%loan_id, "shutdown while queue full, delivering claimed loan");
                    stopping = true;
                    queue.reserve().await
                }
            };
            let Ok(permit) = permit else {
                warn!(%loan_id, "loan claimed after workers exited, left in processing");
                return Ok(Feed::QueueClosed(tick));
            };
            permit.send(claimed);
            tick.claimed += 1;

            if stopping {
                return Ok(Feed::Stopped(tick));
            }
        }

        Ok(Feed::Continue(tick))
    }
}
