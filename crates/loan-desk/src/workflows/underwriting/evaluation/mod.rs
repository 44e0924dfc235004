mod config;
mod policy;

pub use config::ThresholdConfig;
pub use policy::Route;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::domain::Loan;
use policy::route_for;

/// Stand-in for real scoring or verification work done before a loan is routed.
#[async_trait]
pub trait RiskReview: Send + Sync {
    async fn review(&self, loan: &Loan);
}

/// Sleeps for a uniformly random duration within `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedReview {
    min: Duration,
    max: Duration,
}

impl SimulatedReview {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn pick_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait]
impl RiskReview for SimulatedReview {
    async fn review(&self, loan: &Loan) {
        let delay = self.pick_delay();
        tracing::debug!(
            loan_id = %loan.id,
            delay_ms = delay.as_millis() as u64,
            "reviewing loan"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Runs the review step and applies the amount thresholds.
pub struct UnderwritingEngine {
    thresholds: ThresholdConfig,
    review: Arc<dyn RiskReview>,
}

impl UnderwritingEngine {
    pub fn new(thresholds: ThresholdConfig, review: Arc<dyn RiskReview>) -> Self {
        Self { thresholds, review }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Routing without the review step.
    pub fn route(&self, loan: &Loan) -> Route {
        route_for(loan.amount, &self.thresholds)
    }

    pub async fn evaluate(&self, loan: &Loan) -> Route {
        self.review.review(loan).await;
        self.route(loan)
    }
}
