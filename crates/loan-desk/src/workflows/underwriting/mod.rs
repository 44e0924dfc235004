//! Loan underwriting pipeline.
//!
//! A [`JobFeeder`] claims `Applied` loans on a fixed interval and pushes them onto a bounded
//! queue. A [`WorkerPool`] evaluates each one and either decides it by amount or hands it to
//! the least-loaded agent. Agents close the loop through [`LoanService::apply_decision`].

pub mod domain;
pub mod error;
pub(crate) mod evaluation;
pub mod feeder;
pub mod processor;
pub mod repository;
pub mod retry;
pub mod router;
pub mod selector;
pub mod service;
pub mod status;
pub mod store;
pub mod worker;

#[cfg(test)]
mod tests;

pub use domain::{
    Agent, AgentDecision, AgentId, AssignmentRecord, Customer, CustomerId, DeadLetter, Loan,
    LoanCategory, LoanId, LoanPage, LoanStatus, LoanSubmission, NewAgent, NewCustomer, NewLoan,
    TopCustomer,
};
pub use error::{LendingError, Missing};
pub use evaluation::{RiskReview, Route, SimulatedReview, ThresholdConfig, UnderwritingEngine};
pub use feeder::{FeedTick, JobFeeder};
pub use processor::{LoanProcessor, ProcessorConfig, ProcessorReport};
pub use repository::{
    ClaimOutcome, LendingRepository, NotificationError, Notifier, RepositoryError,
};
pub use retry::RetryPolicy;
pub use router::underwriting_router;
pub use selector::select_agent;
pub use service::{LendingSettings, LoanService, PaginationConfig};
pub use status::TransitionError;
pub use store::InMemoryLendingStore;
pub use worker::{LoanWorker, WorkOutcome, WorkerPool, WorkerStats};
