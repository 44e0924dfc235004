use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use super::domain::{
    Agent, AgentDecision, AgentId, Customer, CustomerId, DeadLetter, Loan, LoanId, LoanPage,
    LoanStatus, LoanSubmission, NewAgent, NewCustomer, NewLoan, TopCustomer,
};
use super::error::{LendingError, Missing};
use super::evaluation::{RiskReview, SimulatedReview, ThresholdConfig, UnderwritingEngine};
use super::processor::{LoanProcessor, ProcessorConfig, ProcessorReport};
use super::repository::{LendingRepository, Notifier, RepositoryError};
use super::status;

const SMS_APPROVED_BY_AGENT: &str = "Your loan has been approved by our agent.";
const SMS_REJECTED_BY_AGENT: &str = "loan has been rejected after review.";
const TOP_CUSTOMER_LIMIT: usize = 3;

/// Page size bounds for loan listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub min_page_size: usize,
    pub max_page_size: usize,
    pub default_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            min_page_size: 1,
            max_page_size: 100,
            default_page_size: 10,
        }
    }
}

impl PaginationConfig {
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(self.min_page_size, self.max_page_size.max(self.min_page_size))
    }
}

/// Everything the lending service needs beyond its collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LendingSettings {
    pub thresholds: ThresholdConfig,
    pub processor: ProcessorConfig,
    pub pagination: PaginationConfig,
}

/// Facade over the store, the notifier, and the underwriting pipeline.
pub struct LoanService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    engine: Arc<UnderwritingEngine>,
    settings: LendingSettings,
}

impl<R, N> LoanService<R, N>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, settings: LendingSettings) -> Self {
        let review = SimulatedReview::new(
            settings.processor.review_delay_min,
            settings.processor.review_delay_max,
        );
        let engine = Arc::new(UnderwritingEngine::new(settings.thresholds, Arc::new(review)));
        Self {
            repository,
            notifier,
            engine,
            settings,
        }
    }

    /// Replace the review step, e.g. with [`SimulatedReview::instant`] in tests.
    pub fn with_review(mut self, review: Arc<dyn RiskReview>) -> Self {
        self.engine = Arc::new(UnderwritingEngine::new(self.settings.thresholds, review));
        self
    }

    pub fn settings(&self) -> &LendingSettings {
        &self.settings
    }

    /// Record a new application in `Applied`, creating the customer on first contact.
    pub fn submit_loan(&self, submission: LoanSubmission) -> Result<Loan, LendingError> {
        let name = required("customer_name", &submission.customer_name)?;
        let phone = required("customer_phone", &submission.customer_phone)?;
        if submission.amount <= Decimal::ZERO {
            return Err(LendingError::Validation(
                "loan_amount must be greater than zero".to_string(),
            ));
        }

        let customer = self.find_or_create_customer(name, phone)?;
        let loan = self
            .repository
            .insert_loan(NewLoan {
                customer_id: customer.id,
                amount: submission.amount,
                category: submission.category,
                created_at: Utc::now(),
            })
            .map_err(|err| match err {
                RepositoryError::NotFound => {
                    LendingError::DataIntegrity(format!("customer {} vanished", customer.id))
                }
                other => other.into(),
            })?;

        info!(
            loan_id = %loan.id,
            customer_id = %customer.id,
            amount = %loan.amount,
            "loan submitted"
        );
        Ok(loan)
    }

    fn find_or_create_customer(&self, name: &str, phone: &str) -> Result<Customer, LendingError> {
        if let Some(existing) = self.repository.find_customer_by_phone(phone)? {
            return Ok(existing);
        }

        let created = self.repository.insert_customer(NewCustomer {
            name: name.to_string(),
            phone: phone.to_string(),
            email: None,
        });
        match created {
            Ok(customer) => Ok(customer),
            // Lost a race with another submission for the same phone.
            Err(RepositoryError::Conflict) => self
                .repository
                .find_customer_by_phone(phone)?
                .ok_or_else(|| {
                    LendingError::DataIntegrity(format!("customer with phone {phone} vanished"))
                }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn processor(&self) -> LoanProcessor<R, N> {
        LoanProcessor::new(
            self.repository.clone(),
            self.notifier.clone(),
            self.engine.clone(),
            self.settings.processor,
        )
    }

    /// Run the feeder and worker pool until `shutdown` fires and the queue drains.
    pub async fn run_processor(&self, shutdown: watch::Receiver<bool>) -> ProcessorReport {
        self.processor().run(shutdown).await
    }

    /// Record an agent's verdict on a loan assigned to them.
    pub fn apply_decision(
        &self,
        agent_id: AgentId,
        loan_id: LoanId,
        decision: &str,
    ) -> Result<Loan, LendingError> {
        let loan = self.get_loan(loan_id)?;
        self.get_agent(agent_id)?;

        if loan.assigned_agent != Some(agent_id) {
            return Err(LendingError::NotAssigned { loan_id, agent_id });
        }
        if loan.status != LoanStatus::UnderReview {
            return Err(LendingError::StateConflict {
                loan_id,
                expected: LoanStatus::UnderReview,
                actual: loan.status,
            });
        }

        let decision = AgentDecision::parse(decision)
            .ok_or_else(|| LendingError::InvalidDecision(decision.to_string()))?;
        let target = status::transition(loan.status, decision.target_status())
            .map_err(|err| LendingError::from_transition(loan_id, err))?;

        let customer = self
            .repository
            .get_customer(loan.customer_id)?
            .ok_or_else(|| {
                LendingError::DataIntegrity(format!(
                    "loan {} references missing customer {}",
                    loan_id, loan.customer_id
                ))
            })?;

        let decided = self.repository.update_loan_status(
            loan_id,
            LoanStatus::UnderReview,
            target,
            Some(agent_id),
        )?;

        let message = match decision {
            AgentDecision::Approve => SMS_APPROVED_BY_AGENT,
            AgentDecision::Reject => SMS_REJECTED_BY_AGENT,
        };
        if let Err(err) = self.notifier.send_sms(&customer.phone, message) {
            warn!(%loan_id, customer_id = %customer.id, error = %err, "customer sms failed");
        }

        info!(%loan_id, %agent_id, status = %decided.status, "agent decision recorded");
        Ok(decided)
    }

    /// Loan totals for every status, zeros included.
    pub fn status_counts(&self) -> Result<BTreeMap<LoanStatus, usize>, LendingError> {
        let mut counts: BTreeMap<LoanStatus, usize> =
            LoanStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        for loan in self.repository.list_loans()? {
            *counts.entry(loan.status).or_default() += 1;
        }
        Ok(counts)
    }

    /// One-based page of loans in id order, optionally filtered by status.
    pub fn list_loans(
        &self,
        status: Option<LoanStatus>,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<LoanPage, LendingError> {
        if page == 0 {
            return Err(LendingError::Validation("page must be at least 1".to_string()));
        }
        let size = self.settings.pagination.page_size(page_size);

        let loans = match status {
            Some(status) => self.repository.list_loans_by_status(status)?,
            None => self.repository.list_loans()?,
        };
        let total = loans.len();
        let offset = (page - 1).saturating_mul(size);

        Ok(LoanPage {
            loans: loans.into_iter().skip(offset).take(size).collect(),
            page,
            size,
            total,
        })
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Loan, LendingError> {
        self.repository
            .get_loan(loan_id)?
            .ok_or(LendingError::NotFound(Missing::Loan(loan_id)))
    }

    pub fn create_customer(&self, customer: NewCustomer) -> Result<Customer, LendingError> {
        let name = required("name", &customer.name)?.to_string();
        let phone = required("phone", &customer.phone)?.to_string();

        let stored = self
            .repository
            .insert_customer(NewCustomer {
                name,
                phone,
                email: customer.email,
            })
            .map_err(|err| match err {
                RepositoryError::Conflict => LendingError::Validation(format!(
                    "customer with phone {} already exists",
                    customer.phone.trim()
                )),
                other => other.into(),
            })?;

        info!(customer_id = %stored.id, "customer created");
        Ok(stored)
    }

    pub fn get_customer(&self, customer_id: CustomerId) -> Result<Customer, LendingError> {
        self.repository
            .get_customer(customer_id)?
            .ok_or(LendingError::NotFound(Missing::Customer(customer_id)))
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>, LendingError> {
        Ok(self.repository.list_customers()?)
    }

    /// Customers with the most approved loans, system and agent approvals combined.
    pub fn top_customers(&self) -> Result<Vec<TopCustomer>, LendingError> {
        let mut approved: BTreeMap<CustomerId, usize> = BTreeMap::new();
        for loan in self.repository.list_loans()? {
            if loan.status.is_approved() {
                *approved.entry(loan.customer_id).or_default() += 1;
            }
        }

        let mut ranked: Vec<(CustomerId, usize)> = approved.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut top = Vec::with_capacity(TOP_CUSTOMER_LIMIT);
        for (customer_id, approved_loans) in ranked.into_iter().take(TOP_CUSTOMER_LIMIT) {
            let customer = self.repository.get_customer(customer_id)?.ok_or_else(|| {
                LendingError::DataIntegrity(format!(
                    "approved loans reference missing customer {customer_id}"
                ))
            })?;
            top.push(TopCustomer {
                customer_name: customer.name,
                approved_loans,
            });
        }
        Ok(top)
    }

    /// Register an agent. A manager must exist, must not be the agent itself, and must not
    /// report to anyone.
    pub fn create_agent(&self, agent: NewAgent) -> Result<Agent, LendingError> {
        let name = required("name", &agent.name)?.to_string();

        if let Some(manager_id) = agent.manager {
            if agent.id == Some(manager_id) {
                return Err(LendingError::Validation(
                    "an agent cannot manage itself".to_string(),
                ));
            }
            let manager = self.get_agent(manager_id)?;
            if manager.manager.is_some() {
                return Err(LendingError::Validation(format!(
                    "agent {manager_id} reports to a manager and cannot manage others"
                )));
            }
        }

        let requested = agent.id;
        let stored = self
            .repository
            .insert_agent(NewAgent {
                id: requested,
                name,
                manager: agent.manager,
            })
            .map_err(|err| match (err, requested) {
                (RepositoryError::Conflict, Some(id)) => {
                    LendingError::Validation(format!("agent {id} already exists"))
                }
                (other, _) => other.into(),
            })?;

        info!(agent_id = %stored.id, manager_id = ?stored.manager, "agent created");
        Ok(stored)
    }

    pub fn get_agent(&self, agent_id: AgentId) -> Result<Agent, LendingError> {
        self.repository
            .get_agent(agent_id)?
            .ok_or(LendingError::NotFound(Missing::Agent(agent_id)))
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>, LendingError> {
        Ok(self.repository.list_agents()?)
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, LendingError> {
        Ok(self.repository.dead_letters()?)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, LendingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LendingError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}
