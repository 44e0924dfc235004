use super::domain::{AgentId, CustomerId, LoanId, LoanStatus};
use super::repository::RepositoryError;
use super::status::TransitionError;

/// Missing entity reported by [`LendingError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Loan(LoanId),
    Agent(AgentId),
    Customer(CustomerId),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Loan(id) => write!(f, "loan {id} not found"),
            Missing::Agent(id) => write!(f, "agent {id} not found"),
            Missing::Customer(id) => write!(f, "customer {id} not found"),
        }
    }
}

/// Errors raised by the lending service, the worker pool, and the decision endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(Missing),
    #[error("loan {loan_id} is {actual}, expected {expected}")]
    StateConflict {
        loan_id: LoanId,
        expected: LoanStatus,
        actual: LoanStatus,
    },
    #[error("loan {loan_id} is not assigned to agent {agent_id}")]
    NotAssigned { loan_id: LoanId, agent_id: AgentId },
    #[error("invalid decision '{0}', must be APPROVE or REJECT")]
    InvalidDecision(String),
    #[error("no agent available to review loan {0}")]
    NoAgentAvailable(LoanId),
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
    #[error("persistence failure: {0}")]
    Persistence(#[source] RepositoryError),
}

impl From<RepositoryError> for LendingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::StaleStatus {
                loan_id,
                expected,
                actual,
            } => LendingError::StateConflict {
                loan_id,
                expected,
                actual,
            },
            other => LendingError::Persistence(other),
        }
    }
}

impl LendingError {
    pub(crate) fn from_transition(loan_id: LoanId, err: TransitionError) -> Self {
        LendingError::StateConflict {
            loan_id,
            expected: required_source(err.to).unwrap_or(err.from),
            actual: err.from,
        }
    }

    /// Whether a background retry could change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LendingError::NoAgentAvailable(_)
                | LendingError::Persistence(RepositoryError::Unavailable(_))
        )
    }
}

fn required_source(to: LoanStatus) -> Option<LoanStatus> {
    match to {
        LoanStatus::Processing => Some(LoanStatus::Applied),
        LoanStatus::ApprovedBySystem | LoanStatus::RejectedBySystem | LoanStatus::UnderReview => {
            Some(LoanStatus::Processing)
        }
        LoanStatus::ApprovedByAgent | LoanStatus::RejectedByAgent => Some(LoanStatus::UnderReview),
        LoanStatus::Applied => None,
    }
}
