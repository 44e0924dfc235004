use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for loans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

/// Identifier wrapper for customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u64);

/// Identifier wrapper for agents. Ordering is the selector's tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanCategory {
    Personal,
    Home,
    Auto,
    Business,
}

/// Lifecycle of a loan application. Variant order is the reporting order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Applied,
    Processing,
    ApprovedBySystem,
    RejectedBySystem,
    UnderReview,
    ApprovedByAgent,
    RejectedByAgent,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 7] = [
        LoanStatus::Applied,
        LoanStatus::Processing,
        LoanStatus::ApprovedBySystem,
        LoanStatus::RejectedBySystem,
        LoanStatus::UnderReview,
        LoanStatus::ApprovedByAgent,
        LoanStatus::RejectedByAgent,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LoanStatus::Applied => "APPLIED",
            LoanStatus::Processing => "PROCESSING",
            LoanStatus::ApprovedBySystem => "APPROVED_BY_SYSTEM",
            LoanStatus::RejectedBySystem => "REJECTED_BY_SYSTEM",
            LoanStatus::UnderReview => "UNDER_REVIEW",
            LoanStatus::ApprovedByAgent => "APPROVED_BY_AGENT",
            LoanStatus::RejectedByAgent => "REJECTED_BY_AGENT",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            LoanStatus::ApprovedBySystem
                | LoanStatus::RejectedBySystem
                | LoanStatus::ApprovedByAgent
                | LoanStatus::RejectedByAgent
        )
    }

    /// Statuses that carry an assigned agent.
    pub const fn requires_agent(self) -> bool {
        matches!(
            self,
            LoanStatus::UnderReview | LoanStatus::ApprovedByAgent | LoanStatus::RejectedByAgent
        )
    }

    /// Statuses that count against an agent's active caseload.
    pub const fn is_active(self) -> bool {
        matches!(self, LoanStatus::Processing | LoanStatus::UnderReview)
    }

    pub const fn is_approved(self) -> bool {
        matches!(
            self,
            LoanStatus::ApprovedBySystem | LoanStatus::ApprovedByAgent
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    #[serde(rename = "loan_id")]
    pub id: LoanId,
    pub customer_id: CustomerId,
    #[serde(rename = "loan_amount")]
    pub amount: Decimal,
    #[serde(rename = "loan_type")]
    pub category: LoanCategory,
    #[serde(rename = "application_status")]
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "assigned_agent_id")]
    pub assigned_agent: Option<AgentId>,
}

/// Loan as handed to the store before an identifier is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub category: LoanCategory,
    pub created_at: DateTime<Utc>,
}

/// Intake payload. The customer is matched by phone and created when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSubmission {
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(rename = "loan_amount")]
    pub amount: Decimal,
    #[serde(rename = "loan_type")]
    pub category: LoanCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Underwriting agent. Agents without a manager are managers and never take caseload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "manager_id")]
    pub manager: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_assignable(&self) -> bool {
        self.manager.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgent {
    /// Explicit identifier, used when seeding a known roster.
    #[serde(default)]
    pub id: Option<AgentId>,
    pub name: String,
    #[serde(default, rename = "manager_id")]
    pub manager: Option<AgentId>,
}

/// Append-only audit row written on every assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub loan_id: LoanId,
    pub agent_id: AgentId,
    pub assigned_at: DateTime<Utc>,
}

/// A loan the pipeline stopped retrying. The loan itself stays in `Processing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub loan_id: LoanId,
    pub reason: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Agent verdict on a loan under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentDecision {
    Approve,
    Reject,
}

impl AgentDecision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Some(AgentDecision::Approve),
            "REJECT" => Some(AgentDecision::Reject),
            _ => None,
        }
    }

    pub const fn target_status(self) -> LoanStatus {
        match self {
            AgentDecision::Approve => LoanStatus::ApprovedByAgent,
            AgentDecision::Reject => LoanStatus::RejectedByAgent,
        }
    }
}

/// Approved-loan tally used by the customer leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopCustomer {
    pub customer_name: String,
    pub approved_loans: usize,
}

/// Slice of a filtered loan listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanPage {
    pub loans: Vec<Loan>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}
