use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Agent, AgentId, AssignmentRecord, Customer, CustomerId, DeadLetter, Loan, LoanId, LoanStatus,
    NewAgent, NewCustomer, NewLoan,
};
use super::repository::{ClaimOutcome, LendingRepository, RepositoryError};

/// Mutex-guarded store. Compound operations run under a single lock acquisition, which is
/// what makes `claim_loan` and `assign_loan` atomic.
#[derive(Default)]
pub struct InMemoryLendingStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    loans: BTreeMap<LoanId, Loan>,
    customers: BTreeMap<CustomerId, Customer>,
    agents: BTreeMap<AgentId, Agent>,
    assignments: Vec<AssignmentRecord>,
    dead_letters: Vec<DeadLetter>,
    next_loan: u64,
    next_customer: u64,
    next_agent: u64,
}

impl StoreState {
    fn cas_status(
        &mut self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
        assigned_agent: Option<AgentId>,
    ) -> Result<Loan, RepositoryError> {
        let loan = self.loans.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if loan.status != from {
            return Err(RepositoryError::StaleStatus {
                loan_id: id,
                expected: from,
                actual: loan.status,
            });
        }
        loan.status = to;
        loan.assigned_agent = assigned_agent;
        Ok(loan.clone())
    }
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

impl LendingRepository for InMemoryLendingStore {
    fn insert_loan(&self, loan: NewLoan) -> Result<Loan, RepositoryError> {
        let mut state = self.lock()?;
        if !state.customers.contains_key(&loan.customer_id) {
            return Err(RepositoryError::NotFound);
        }
        state.next_loan += 1;
        let stored = Loan {
            id: LoanId(state.next_loan),
            customer_id: loan.customer_id,
            amount: loan.amount,
            category: loan.category,
            status: LoanStatus::Applied,
            created_at: loan.created_at,
            assigned_agent: None,
        };
        state.loans.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>, RepositoryError> {
        Ok(self.lock()?.loans.get(&id).cloned())
    }

    fn list_loans(&self) -> Result<Vec<Loan>, RepositoryError> {
        Ok(self.lock()?.loans.values().cloned().collect())
    }

    fn list_loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, RepositoryError> {
        Ok(self
            .lock()?
            .loans
            .values()
            .filter(|loan| loan.status == status)
            .cloned()
            .collect())
    }

    fn claim_loan(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<ClaimOutcome, RepositoryError> {
        let mut state = self.lock()?;
        match state.loans.get_mut(&id) {
            Some(loan) if loan.status == from => {
                loan.status = to;
                Ok(ClaimOutcome::Claimed(loan.clone()))
            }
            Some(_) | None => Ok(ClaimOutcome::Conflict),
        }
    }

    fn update_loan_status(
        &self,
        id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
        assigned_agent: Option<AgentId>,
    ) -> Result<Loan, RepositoryError> {
        self.lock()?.cas_status(id, from, to, assigned_agent)
    }

    fn create_assignment_record(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<AssignmentRecord, RepositoryError> {
        let mut state = self.lock()?;
        if !state.loans.contains_key(&loan_id) || !state.agents.contains_key(&agent_id) {
            return Err(RepositoryError::NotFound);
        }
        let record = AssignmentRecord {
            loan_id,
            agent_id,
            assigned_at,
        };
        state.assignments.push(record.clone());
        Ok(record)
    }

    fn assign_loan(
        &self,
        loan_id: LoanId,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> Result<(Loan, AssignmentRecord), RepositoryError> {
        let mut state = self.lock()?;
        if !state.agents.contains_key(&agent_id) {
            return Err(RepositoryError::NotFound);
        }
        let loan = state.cas_status(
            loan_id,
            LoanStatus::Processing,
            LoanStatus::UnderReview,
            Some(agent_id),
        )?;
        let record = AssignmentRecord {
            loan_id,
            agent_id,
            assigned_at,
        };
        state.assignments.push(record.clone());
        Ok((loan, record))
    }

    fn assignments_for_loan(
        &self,
        loan_id: LoanId,
    ) -> Result<Vec<AssignmentRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .assignments
            .iter()
            .filter(|record| record.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn agent_active_caseloads(&self) -> Result<BTreeMap<AgentId, usize>, RepositoryError> {
        let state = self.lock()?;
        let mut caseloads: BTreeMap<AgentId, usize> = state
            .agents
            .values()
            .filter(|agent| agent.is_assignable())
            .map(|agent| (agent.id, 0))
            .collect();

        for loan in state.loans.values().filter(|loan| loan.status.is_active()) {
            if let Some(count) = loan
                .assigned_agent
                .and_then(|agent| caseloads.get_mut(&agent))
            {
                *count += 1;
            }
        }

        Ok(caseloads)
    }

    fn insert_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let mut state = self.lock()?;
        if state
            .customers
            .values()
            .any(|existing| existing.phone == customer.phone)
        {
            return Err(RepositoryError::Conflict);
        }
        state.next_customer += 1;
        let stored = Customer {
            id: CustomerId(state.next_customer),
            name: customer.name,
            phone: customer.phone,
            email: customer.email,
            created_at: Utc::now(),
        };
        state.customers.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.lock()?.customers.get(&id).cloned())
    }

    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .lock()?
            .customers
            .values()
            .find(|customer| customer.phone == phone)
            .cloned())
    }

    fn list_customers(&self) -> Result<Vec<Customer>, RepositoryError> {
        Ok(self.lock()?.customers.values().cloned().collect())
    }

    fn insert_agent(&self, agent: NewAgent) -> Result<Agent, RepositoryError> {
        let mut state = self.lock()?;
        let id = match agent.id {
            Some(id) if state.agents.contains_key(&id) => return Err(RepositoryError::Conflict),
            Some(id) => id,
            None => AgentId(state.next_agent + 1),
        };
        state.next_agent = state.next_agent.max(id.0);
        let stored = Agent {
            id,
            name: agent.name,
            manager: agent.manager,
            created_at: Utc::now(),
        };
        state.agents.insert(id, stored.clone());
        Ok(stored)
    }

    fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.lock()?.agents.get(&id).cloned())
    }

    fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.lock()?.agents.values().cloned().collect())
    }

    fn record_dead_letter(&self, entry: DeadLetter) -> Result<(), RepositoryError> {
        self.lock()?.dead_letters.push(entry);
        Ok(())
    }

    fn dead_letters(&self) -> Result<Vec<DeadLetter>, RepositoryError> {
        Ok(self.lock()?.dead_letters.clone())
    }
}
