use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::LoanStatus;
use super::config::ThresholdConfig;

/// Where an evaluated loan goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    AutoApprove,
    AutoReject,
    AgentReview,
}

impl Route {
    pub const fn target_status(self) -> LoanStatus {
        match self {
            Route::AutoApprove => LoanStatus::ApprovedBySystem,
            Route::AutoReject => LoanStatus::RejectedBySystem,
            Route::AgentReview => LoanStatus::UnderReview,
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Route::AutoApprove => "approved by system",
            Route::AutoReject => "rejected by system",
            Route::AgentReview => "routed to agent review",
        }
    }
}

pub(crate) fn route_for(amount: Decimal, thresholds: &ThresholdConfig) -> Route {
    if amount < thresholds.auto_approve_below {
        Route::AutoApprove
    } else if amount > thresholds.auto_reject_above {
        Route::AutoReject
    } else {
        Route::AgentReview
    }
}
