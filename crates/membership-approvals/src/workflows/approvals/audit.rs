use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ReviewStage, ReviewerId, TransactionId};

/// Transition kinds recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    FinancialReviewStarted,
    FinancialReviewReassigned,
    FinancialApproved,
    FinancialRejected,
    FinalApproved,
    FinalRejected,
    PaymentStatusChanged,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            AuditAction::FinancialReviewStarted => "financial_review_started",
            AuditAction::FinancialReviewReassigned => "financial_review_reassigned",
            AuditAction::FinancialApproved => "financial_approved",
            AuditAction::FinancialRejected => "financial_rejected",
            AuditAction::FinalApproved => "final_approved",
            AuditAction::FinalRejected => "final_rejected",
            AuditAction::PaymentStatusChanged => "payment_status_changed",
        }
    }
}

/// One state transition, emitted after the write it describes has landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub transaction_id: TransactionId,
    pub stage: ReviewStage,
    pub action: AuditAction,
    pub reviewer_id: ReviewerId,
    pub from_status: String,
    pub to_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set when the transition was made by the auto-approval policy.
    pub automatic: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only sink for audit events (database table, log shipper, ...).
pub trait AuditEmitter: Send + Sync {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
