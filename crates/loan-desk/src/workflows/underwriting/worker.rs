use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::domain::{Agent, Customer, DeadLetter, Loan, LoanId, LoanStatus};
use super::error::{LendingError, Missing};
use super::evaluation::{Route, UnderwritingEngine};
use super::repository::{LendingRepository, Notifier};
use super::retry::{pause, wait_for_shutdown, RetryPolicy};
use super::selector::select_agent;
use super::status;

pub(crate) const SMS_APPROVED_BY_SYSTEM: &str = "Your loan has been approved by system.";
pub(crate) const SMS_REJECTED_BY_SYSTEM: &str = "loan application has been rejected by system.";

/// What a worker did with a claimed loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Decided { loan: Loan, route: Route },
    Assigned { loan: Loan, agent: Agent },
}

impl WorkOutcome {
    pub fn loan(&self) -> &Loan {
        match self {
            WorkOutcome::Decided { loan, .. } | WorkOutcome::Assigned { loan, .. } => loan,
        }
    }
}

/// Decision logic applied to one claimed loan at a time.
pub struct LoanWorker<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    engine: Arc<UnderwritingEngine>,
    retry: RetryPolicy,
}

impl<R, N> LoanWorker<R, N>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        engine: Arc<UnderwritingEngine>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            notifier,
            engine,
            retry,
        }
    }

    /// Review, route, and persist a loan already claimed into `Processing`.
    ///
    /// On any error the loan is left in `Processing`.
    pub async fn process(
        &self,
        loan: Loan,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<WorkOutcome, LendingError> {
        let route = self.engine.evaluate(&loan).await;

        let customer = self
            .with_retry(loan.id, shutdown, || {
                self.repository
                    .get_customer(loan.customer_id)?
                    .ok_or_else(|| {
                        LendingError::DataIntegrity(format!(
                            "loan {} references missing customer {}",
                            loan.id, loan.customer_id
                        ))
                    })
            })
            .await?;

        let target = status::transition(loan.status, route.target_status())
            .map_err(|err| LendingError::from_transition(loan.id, err))?;

        match route {
            Route::AutoApprove | Route::AutoReject => {
                let decided = self
                    .with_retry(loan.id, shutdown, || {
                        self.repository
                            .update_loan_status(loan.id, loan.status, target, None)
                            .map_err(LendingError::from)
                    })
                    .await?;

                let message = if route == Route::AutoApprove {
                    SMS_APPROVED_BY_SYSTEM
                } else {
                    SMS_REJECTED_BY_SYSTEM
                };
                self.sms(&customer, decided.id, message);

                info!(loan_id = %decided.id, status = %decided.status, "loan decided by system");
                Ok(WorkOutcome::Decided {
                    loan: decided,
                    route,
                })
            }
            Route::AgentReview => {
                let (assigned, agent) = self
                    .with_retry(loan.id, shutdown, || self.assign(&loan))
                    .await?;

                self.push(
                    &agent,
                    assigned.id,
                    &format!("New loan #{} assigned to you for review", assigned.id),
                );
                if let Some(manager) = agent.manager {
                    let message = format!(
                        "Loan #{} assigned to your team member {}",
                        assigned.id, agent.name
                    );
                    if let Err(err) = self.notifier.send_push(manager, &message) {
                        warn!(
                            loan_id = %assigned.id,
                            agent_id = %manager,
                            error = %err,
                            "manager push failed"
                        );
                    }
                }

                info!(loan_id = %assigned.id, agent_id = %agent.id, "loan assigned for review");
                Ok(WorkOutcome::Assigned {
                    loan: assigned,
                    agent,
                })
            }
        }
    }

    fn assign(&self, loan: &Loan) -> Result<(Loan, Agent), LendingError> {
        let caseloads = self.repository.agent_active_caseloads()?;
        let agent_id = select_agent(&caseloads).ok_or(LendingError::NoAgentAvailable(loan.id))?;
        let agent = self
            .repository
            .get_agent(agent_id)?
            .ok_or(LendingError::NotFound(Missing::Agent(agent_id)))?;

        let (assigned, record) = self.repository.assign_loan(loan.id, agent.id, Utc::now())?;
        debug!(
            loan_id = %record.loan_id,
            agent_id = %record.agent_id,
            caseload = caseloads.get(&agent_id).copied().unwrap_or_default(),
            "assignment recorded"
        );
        Ok((assigned, agent))
    }

    /// Run `op`, backing off between transient failures. Exhausting the policy or a shutdown
    /// during a backoff writes a dead letter, since the loan stays in `Processing` either way.
    async fn with_retry<T, F>(
        &self,
        loan_id: LoanId,
        shutdown: &mut watch::Receiver<bool>,
        mut op: F,
    ) -> Result<T, LendingError>
    where
        F: FnMut() -> Result<T, LendingError>,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            if attempt >= attempts {
                error!(
                    %loan_id,
                    attempt,
                    error = %err,
                    "retries exhausted, loan left in processing"
                );
                self.dead_letter(loan_id, err.to_string(), attempt);
                return Err(err);
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                %loan_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            if !pause(delay, shutdown).await {
                warn!(%loan_id, attempt, "shutdown during backoff, loan left in processing");
                self.dead_letter(loan_id, format!("shutdown during backoff: {err}"), attempt);
                return Err(err);
            }
            attempt += 1;
        }
    }

    fn dead_letter(&self, loan_id: LoanId, reason: String, attempts: u32) {
        let entry = DeadLetter {
            loan_id,
            reason,
            attempts,
            recorded_at: Utc::now(),
        };
        if let Err(store_err) = self.repository.record_dead_letter(entry) {
            warn!(%loan_id, error = %store_err, "failed to record dead letter");
        }
    }

    fn sms(&self, customer: &Customer, loan_id: LoanId, message: &str) {
        if let Err(err) = self.notifier.send_sms(&customer.phone, message) {
            warn!(%loan_id, customer_id = %customer.id, error = %err, "customer sms failed");
        }
    }

    fn push(&self, agent: &Agent, loan_id: LoanId, message: &str) {
        if let Err(err) = self.notifier.send_push(agent.id, message) {
            warn!(%loan_id, agent_id = %agent.id, error = %err, "agent push failed");
        }
    }
}

/// Per-worker tallies returned when a worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Fixed set of tasks sharing one queue receiver.
pub struct WorkerPool {
    tasks: JoinSet<WorkerStats>,
}

impl WorkerPool {
    pub fn spawn<R, N>(
        size: usize,
        worker: Arc<LoanWorker<R, N>>,
        queue: mpsc::Receiver<Loan>,
        shutdown: watch::Receiver<bool>,
    ) -> Self
    where
        R: LendingRepository + 'static,
        N: Notifier + 'static,
    {
        let queue = Arc::new(Mutex::new(queue));
        let mut tasks = JoinSet::new();

        for id in 1..=size.max(1) {
            let worker = worker.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(run_worker(id, worker, queue, shutdown));
        }

        Self { tasks }
    }

    /// Wait for every worker to exit.
    pub async fn join(mut self) -> Vec<WorkerStats> {
        let mut stats = Vec::new();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(worker_stats) => stats.push(worker_stats),
                Err(err) => error!(error = %err, "worker task aborted"),
            }
        }
        stats.sort_by_key(|entry| entry.worker);
        stats
    }
}

/// Pull loans until the queue is closed and empty. Shutdown only switches the worker into
/// draining; the feeder closing the queue is what ends the loop.
async fn run_worker<R, N>(
    id: usize,
    worker: Arc<LoanWorker<R, N>>,
    queue: Arc<Mutex<mpsc::Receiver<Loan>>>,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerStats
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    let mut stats = WorkerStats {
        worker: id,
        ..WorkerStats::default()
    };

    let mut draining = false;

    loop {
        let next = {
            let mut receiver = queue.lock().await;
            if draining {
                receiver.recv().await
            } else {
                tokio::select! {
                    item = receiver.recv() => item,
                    _ = wait_for_shutdown(&mut shutdown) => {
                        debug!(worker = id, "shutdown signal, draining queue");
                        draining = true;
                        continue;
                    }
                }
            }
        };
        let Some(loan) = next else {
            debug!(worker = id, "queue closed, worker exiting");
            break;
        };

        let loan_id = loan.id;
        debug!(worker = id, %loan_id, "processing loan");
        match worker.process(loan, &mut shutdown).await {
            Ok(_) => stats.processed += 1,
            Err(err) => {
                stats.failed += 1;
                warn!(
                    worker = id,
                    %loan_id,
                    error = %err,
                    status = %LoanStatus::Processing,
                    "loan processing stopped"
                );
            }
        }
    }

    stats
}
