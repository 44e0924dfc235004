use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::domain::{
    Agent, AgentId, AssignmentRecord, Customer, CustomerId, DeadLetter, Loan, LoanId, LoanStatus,
    NewAgent, NewCustomer, NewLoan,
};

/// Result of an atomic claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the loan, returned in its new status.
    Claimed(Loan),
    /// Another caller moved the loan first, or it no longer exists in `from`.
    Conflict,
}

/// Storage abstraction consumed by the pipeline and the service facade.
///
/// Every status write is a compare-and-set against the expected current status, so
/// implementations must apply each call atomically with respect to concurrent callers.
pub trait LendingRepository: Send + Sync {
    fn insert_loan(&self, loan: NewLoan) -> Result<Loan, RepositoryError>;
    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>, RepositoryError>;
    /// All loans in id order.
    fn list_loans(&self) -> Result<Vec<Loan>, RepositoryError>;
    /// Loans currently in `status`, in id order.
    fn list_loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, RepositoryError>;

    fn claim_loan(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<ClaimOutcome, RepositoryError>;

    /// Move a loan from `from` to `to`, replacing the assigned agent.
    fn update_loan_status(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
        assigned_agent: Option<AgentId>,
    ) -> Result<Loan, RepositoryError>;

    /// Append a standalone audit row. The worker goes through [`assign_loan`] instead, which
    /// writes the same row together with the status change.
    ///
    /// [`assign_loan`]: LendingRepository::assign_loan
    fn create_assignment_record(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<AssignmentRecord, RepositoryError>;

    /// `Processing -> UnderReview` with the agent set, plus the audit row, in one transaction.
    fn assign_loan(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<(Loan, AssignmentRecord), RepositoryError>;

    fn assignments_for_loan(&self, loan_id: LoanId)
        -> Result<Vec<AssignmentRecord>, RepositoryError>;

    /// Active caseload per assignable agent, zero counts included.
    fn agent_active_caseloads(&self) -> Result<BTreeMap<AgentId, usize>, RepositoryError>;

    fn insert_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError>;
    fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;
    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError>;
    fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError>;

    fn insert_agent(&self, agent: NewAgent) -> Result<Agent, RepositoryError>;
    fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;
    fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError>;

    fn record_dead_letter(&self, entry: DeadLetter) -> Result<(), RepositoryError>;
    fn dead_letters(&self) -> Result<Vec<DeadLetter>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("loan {loan_id} is {actual}, expected {expected}")]
    StaleStatus {
        loan_id: LoanId,
        expected: LoanStatus,
        actual: LoanStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound customer and agent notifications. Callers treat these as fire-and-forget.
pub trait Notifier: Send + Sync {
    fn send_sms(&self, phone: &str, message: &str) -> Result<(), NotificationError>;
    fn send_push(&self, agent_id: AgentId, message: &str) -> Result<(), NotificationError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
