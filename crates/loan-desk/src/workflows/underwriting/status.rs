//! Loan lifecycle transitions.
//!
//! Every status change in the pipeline and the decision endpoint goes through
//! [`transition`], and the store applies it as a compare-and-set on the `from` status.

use super::domain::LoanStatus;

/// Raised when a transition is not in the lifecycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("loan cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: LoanStatus,
    pub to: LoanStatus,
}

pub const fn is_allowed(from: LoanStatus, to: LoanStatus) -> bool {
    use LoanStatus::*;

    matches!(
        (from, to),
        (Applied, Processing)
            | (Processing, ApprovedBySystem)
            | (Processing, RejectedBySystem)
            | (Processing, UnderReview)
            | (UnderReview, ApprovedByAgent)
            | (UnderReview, RejectedByAgent)
    )
}

/// Validate a transition, returning the target status when it is legal.
pub fn transition(from: LoanStatus, to: LoanStatus) -> Result<LoanStatus, TransitionError> {
    if is_allowed(from, to) {
        Ok(to)
    } else {
        Err(TransitionError { from, to })
    }
}

/// Targets reachable from `from`, in reporting order.
pub fn successors(from: LoanStatus) -> Vec<LoanStatus> {
    LoanStatus::ALL
        .into_iter()
        .filter(|to| is_allowed(from, *to))
        .collect()
}
