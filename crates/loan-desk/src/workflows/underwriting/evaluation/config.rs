use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amount bounds for automatic decisions. Amounts inside `[auto_approve_below,
/// auto_reject_above]`, boundaries included, go to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub auto_approve_below: Decimal,
    pub auto_reject_above: Decimal,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            auto_approve_below: Decimal::from(10_000),
            auto_reject_above: Decimal::from(500_000),
        }
    }
}
