use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::info;

use super::evaluation::UnderwritingEngine;
use super::feeder::JobFeeder;
use super::repository::{LendingRepository, Notifier};
use super::retry::RetryPolicy;
use super::worker::{LoanWorker, WorkerPool, WorkerStats};

/// Sizing and pacing for the background pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub feed_interval: Duration,
    pub review_delay_min: Duration,
    pub review_delay_max: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
            feed_interval: Duration::from_secs(5),
            review_delay_min: Duration::from_millis(5_000),
            review_delay_max: Duration::from_millis(25_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Totals reported once the pipeline has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorReport {
    pub enqueued: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Feeder plus worker pool over one bounded queue.
pub struct LoanProcessor<R, N> {
    repository: Arc<R>,
    worker: Arc<LoanWorker<R, N>>,
    config: ProcessorConfig,
}

impl<R, N> LoanProcessor<R, N>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        engine: Arc<UnderwritingEngine>,
        config: ProcessorConfig,
    ) -> Self {
        let worker = Arc::new(LoanWorker::new(
            repository.clone(),
            notifier,
            engine,
            config.retry,
        ));
        Self {
            repository,
            worker,
            config,
        }
    }

    /// Run until `shutdown` flips to `true`. The feeder stops first and closes the queue;
    /// workers finish whatever is already queued before this returns.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> ProcessorReport {
        let workers = self.config.workers.max(1);
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));

        info!(
            workers,
            queue_capacity = self.config.queue_capacity,
            interval_ms = self.config.feed_interval.as_millis() as u64,
            "loan processor started"
        );

        let pool = WorkerPool::spawn(workers, self.worker, receiver, shutdown.clone());
        let feeder = JobFeeder::new(self.repository, self.config.feed_interval);
        let enqueued = feeder.run(sender, shutdown).await;

        let stats = pool.join().await;
        let report = summarize(enqueued, &stats);
        info!(
            enqueued = report.enqueued,
            processed = report.processed,
            failed = report.failed,
            "loan processor drained"
        );
        report
    }
}

fn summarize(enqueued: usize, stats: &[WorkerStats]) -> ProcessorReport {
    stats.iter().fold(
        ProcessorReport {
            enqueued,
            ..ProcessorReport::default()
        },
        |mut report, worker| {
            report.processed += worker.processed;
            report.failed += worker.failed;
            report
        },
    )
}
