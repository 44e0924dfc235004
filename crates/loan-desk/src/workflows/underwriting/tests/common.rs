use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::workflows::underwriting::{
    Agent, AgentId, AssignmentRecord, ClaimOutcome, Customer, CustomerId, DeadLetter,
    InMemoryLendingStore, LendingRepository, LendingSettings, Loan, LoanCategory, LoanId,
    LoanService, LoanStatus, LoanSubmission, NewAgent, NewCustomer, NewLoan, NotificationError,
    Notifier, PaginationConfig, ProcessorConfig, ProcessorReport, RepositoryError, RetryPolicy,
    SimulatedReview, ThresholdConfig,
};

pub(super) type TestService = LoanService<InMemoryLendingStore, RecordingNotifier>;

pub(super) fn settings() -> LendingSettings {
    LendingSettings {
        thresholds: ThresholdConfig::default(),
        processor: ProcessorConfig {
            workers: 3,
            queue_capacity: 8,
            feed_interval: Duration::from_millis(10),
            review_delay_min: Duration::ZERO,
            review_delay_max: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        },
        pagination: PaginationConfig::default(),
    }
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryLendingStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(InMemoryLendingStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service_over(store.clone(), notifier.clone());
    (service, store, notifier)
}

pub(super) fn service_over<R, N>(store: Arc<R>, notifier: Arc<N>) -> LoanService<R, N>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    LoanService::new(store, notifier, settings()).with_review(Arc::new(SimulatedReview::instant()))
}

/// Service whose processor runs with `processor` and a fixed review delay.
pub(super) fn service_with<R, N>(
    store: Arc<R>,
    notifier: Arc<N>,
    processor: ProcessorConfig,
    review_delay: Duration,
) -> LoanService<R, N>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    let settings = LendingSettings {
        processor,
        ..settings()
    };
    LoanService::new(store, notifier, settings)
        .with_review(Arc::new(SimulatedReview::new(review_delay, review_delay)))
}

pub(super) fn submission(phone: &str, amount: Decimal) -> LoanSubmission {
    LoanSubmission {
        customer_name: format!("Customer {phone}"),
        customer_phone: phone.to_string(),
        amount,
        category: LoanCategory::Personal,
    }
}

/// Manager 1 with agents 2 and 3 reporting to them.
pub(super) fn seed_team<R: LendingRepository>(store: &R) -> (Agent, Agent, Agent) {
    let manager = store
        .insert_agent(NewAgent {
            id: Some(AgentId(1)),
            name: "John Manager".to_string(),
            manager: None,
        })
        .expect("manager inserted");
    let alice = store
        .insert_agent(NewAgent {
            id: Some(AgentId(2)),
            name: "Alice Agent".to_string(),
            manager: Some(manager.id),
        })
        .expect("agent inserted");
    let bob = store
        .insert_agent(NewAgent {
            id: Some(AgentId(3)),
            name: "Bob Agent".to_string(),
            manager: Some(manager.id),
        })
        .expect("agent inserted");
    (manager, alice, bob)
}

/// Manager 1 and a single agent 2.
pub(super) fn seed_single_agent<R: LendingRepository>(store: &R) -> (Agent, Agent) {
    let manager = store
        .insert_agent(NewAgent {
            id: Some(AgentId(1)),
            name: "John Manager".to_string(),
            manager: None,
        })
        .expect("manager inserted");
    let agent = store
        .insert_agent(NewAgent {
            id: Some(AgentId(2)),
            name: "Alice Agent".to_string(),
            manager: Some(manager.id),
        })
        .expect("agent inserted");
    (manager, agent)
}

/// Push a submitted loan straight to `UnderReview` with `agent`, skipping the pipeline.
pub(super) fn place_under_review(
    store: &InMemoryLendingStore,
    loan_id: LoanId,
    agent: AgentId,
) -> Loan {
    match store
        .claim_loan(loan_id, LoanStatus::Applied, LoanStatus::Processing)
        .expect("claim runs")
    {
        ClaimOutcome::Claimed(_) => {}
        ClaimOutcome::Conflict => panic!("loan {loan_id} was not in APPLIED"),
    }
    let (loan, _) = store
        .assign_loan(loan_id, agent, Utc::now())
        .expect("assignment succeeds");
    loan
}

/// Run the processor until `done` holds (or five seconds pass), then shut it down.
pub(super) async fn drive_until<R, N, F>(
    service: &LoanService<R, N>,
    mut done: F,
) -> ProcessorReport
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
    F: FnMut() -> bool,
{
    let (shutdown, signal) = watch::channel(false);
    let handle = tokio::spawn(service.processor().run(signal));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let _ = shutdown.send(true);
    handle.await.expect("processor task completes")
}

pub(super) fn status_of<R: LendingRepository>(store: &R, loan_id: LoanId) -> LoanStatus {
    store
        .get_loan(loan_id)
        .expect("store readable")
        .expect("loan present")
        .status
}

pub(super) fn none_pending<R: LendingRepository>(store: &R) -> bool {
    store
        .list_loans()
        .expect("store readable")
        .iter()
        .all(|loan| loan.status != LoanStatus::Applied && loan.status != LoanStatus::Processing)
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sms: Mutex<Vec<(String, String)>>,
    pushes: Mutex<Vec<(AgentId, String)>>,
}

impl RecordingNotifier {
    pub(super) fn sms(&self) -> Vec<(String, String)> {
        self.sms.lock().expect("sms mutex poisoned").clone()
    }

    pub(super) fn pushes(&self) -> Vec<(AgentId, String)> {
        self.pushes.lock().expect("push mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_sms(&self, phone: &str, message: &str) -> Result<(), NotificationError> {
        self.sms
            .lock()
            .expect("sms mutex poisoned")
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }

    fn send_push(&self, agent_id: AgentId, message: &str) -> Result<(), NotificationError> {
        self.pushes
            .lock()
            .expect("push mutex poisoned")
            .push((agent_id, message.to_string()));
        Ok(())
    }
}

pub(super) struct OfflineNotifier;

impl Notifier for OfflineNotifier {
    fn send_sms(&self, _phone: &str, _message: &str) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("sms gateway offline".to_string()))
    }

    fn send_push(&self, _agent_id: AgentId, _message: &str) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("push gateway offline".to_string()))
    }
}

/// In-memory store whose status updates or customer reads fail with `Unavailable` a fixed
/// number of times.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryLendingStore,
    update_failures: AtomicU32,
    customer_failures: AtomicU32,
}

impl FlakyStore {
    pub(super) fn failing_updates(times: u32) -> Self {
        Self {
            update_failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub(super) fn failing_customer_reads(times: u32) -> Self {
        Self {
            customer_failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl LendingRepository for FlakyStore {
    fn insert_loan(&self, loan: NewLoan) -> Result<Loan, RepositoryError> {
        self.inner.insert_loan(loan)
    }

    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>, RepositoryError> {
        self.inner.get_loan(id)
    }

    fn list_loans(&self) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.list_loans()
    }

    fn list_loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.list_loans_by_status(status)
    }

    fn claim_loan(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<ClaimOutcome, RepositoryError> {
        self.inner.claim_loan(id, from, to)
    }

    fn update_loan_status(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
        assigned_agent: Option<AgentId>,
    ) -> Result<Loan, RepositoryError> {
        if Self::take_failure(&self.update_failures) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        self.inner.update_loan_status(id, from, to, assigned_agent)
    }

    fn create_assignment_record(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<AssignmentRecord, RepositoryError> {
        self.inner.create_assignment_record(loan_id, agent_id, assigned_at)
    }

    fn assign_loan(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<(Loan, AssignmentRecord), RepositoryError> {
        self.inner.assign_loan(loan_id, agent_id, assigned_at)
    }

    fn assignments_for_loan(
        &self,
        loan_id: LoanId,
    ) -> Result<Vec<AssignmentRecord>, RepositoryError> {
        self.inner.assignments_for_loan(loan_id)
    }

    fn agent_active_caseloads(&self) -> Result<BTreeMap<AgentId, usize>, RepositoryError> {
        self.inner.agent_active_caseloads()
    }

    fn insert_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        self.inner.insert_customer(customer)
    }

    fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        if Self::take_failure(&self.customer_failures) {
            return Err(RepositoryError::Unavailable("replica lagging".to_string()));
        }
        self.inner.get_customer(id)
    }

    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError> {
        self.inner.find_customer_by_phone(phone)
    }

    fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError> {
        self.inner.list_customers()
    }

    fn insert_agent(&self, agent: NewAgent) -> Result<Agent, RepositoryError> {
        self.inner.insert_agent(agent)
    }

    fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        self.inner.get_agent(id)
    }

    fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        self.inner.list_agents()
    }

    fn record_dead_letter(&self, entry: DeadLetter) -> Result<(), RepositoryError> {
        self.inner.record_dead_letter(entry)
    }

    fn dead_letters(&self) -> Result<Vec<DeadLetter>, RepositoryError> {
        self.inner.dead_letters()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
