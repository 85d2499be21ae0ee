use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{EntityType, FinancialStatus, PaymentStatus, ReviewerId, Transaction};

/// Policy for bypassing manual financial review on low-risk payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovalPolicy {
    pub enabled: bool,
    /// Inclusive upper bound on the payment amount.
    pub max_amount: Decimal,
    pub require_gateway_confirmation: bool,
    /// Entity types the policy applies to; empty means all.
    pub entity_types: Vec<EntityType>,
    pub system_reviewer: ReviewerId,
}

impl Default for AutoApprovalPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_amount: Decimal::new(100, 0),
            require_gateway_confirmation: true,
            entity_types: Vec::new(),
            system_reviewer: ReviewerId(0),
        }
    }
}

impl AutoApprovalPolicy {
    /// Reason the transaction is not eligible, or `None` when it may be auto-approved.
    pub fn ineligibility(&self, record: &Transaction) -> Option<String> {
        if !self.enabled {
            return Some("auto-approval is disabled".to_string());
        }
        if record.financial_status != FinancialStatus::Pending {
            return Some(format!(
                "financial review already {}",
                record.financial_status.label()
            ));
        }
        if record.amount > self.max_amount {
            return Some(format!(
                "amount {} exceeds auto-approval limit {}",
                record.amount, self.max_amount
            ));
        }
        if self.require_gateway_confirmation && record.payment_status != PaymentStatus::Completed
        {
            return Some(format!(
                "payment is {}, gateway confirmation required",
                record.payment_status.label()
            ));
        }
        if !self.entity_types.is_empty() && !self.entity_types.contains(&record.entity_type) {
            return Some(format!(
                "{} transactions are not auto-approved",
                record.entity_type.label()
            ));
        }
        None
    }

    pub fn is_eligible(&self, record: &Transaction) -> bool {
        self.ineligibility(record).is_none()
    }
}

/// Role separation rules shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// Allow the financial reviewer of a transaction to also record its final decision.
    pub allow_self_approval: bool,
}

/// Everything the orchestrator needs to know about approval policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    pub auto_approval: AutoApprovalPolicy,
    pub review: ReviewPolicy,
}
