use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for payment transactions tracked by the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated user performing a review action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub u64);

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Application,
    Renewal,
}

impl EntityType {
    pub const fn label(self) -> &'static str {
        match self {
            EntityType::Application => "application",
            EntityType::Renewal => "renewal",
        }
    }
}

/// Outcome reported by the payment gateway or manual verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// Financial review stage, written only by the financial review engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl FinancialStatus {
    pub const fn label(self) -> &'static str {
        match self {
            FinancialStatus::Pending => "pending",
            FinancialStatus::UnderReview => "under_review",
            FinancialStatus::Approved => "approved",
            FinancialStatus::Rejected => "rejected",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, FinancialStatus::Pending | FinancialStatus::UnderReview)
    }
}

/// Final administrative stage, reachable only after financial approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Pending,
    Approved,
    Rejected,
}

impl FinalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            FinalStatus::Pending => "pending",
            FinalStatus::Approved => "approved",
            FinalStatus::Rejected => "rejected",
        }
    }
}

/// Which of the two review tiers an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Financial,
    Final,
}

impl ReviewStage {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewStage::Financial => "financial",
            ReviewStage::Final => "final",
        }
    }
}

/// Decision a reviewer may record when completing either stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    /// Parse the wire representation used by the HTTP bodies.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(ReviewDecision::Approved),
            "rejected" => Some(ReviewDecision::Rejected),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
        }
    }
}

/// Reviewer input for `complete_review` at either stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReviewSubmission {
    pub fn approve() -> Self {
        Self {
            decision: ReviewDecision::Approved,
            rejection_reason: None,
            notes: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: ReviewDecision::Rejected,
            rejection_reason: Some(reason.into()),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Trimmed rejection reason, treating blank strings as missing.
    pub fn reason(&self) -> Option<&str> {
        self.rejection_reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
    }
}

/// Payment submission used to open a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub entity_type: EntityType,
    pub entity_reference: String,
    pub amount: Decimal,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Pending
}

/// Unified record tracking payment and approval state for one application or renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub entity_type: EntityType,
    pub entity_reference: String,
    pub amount: Decimal,
    pub payment_status: PaymentStatus,
    pub financial_status: FinancialStatus,
    pub financial_reviewer_id: Option<ReviewerId>,
    pub financial_rejection_reason: Option<String>,
    pub financial_admin_notes: Option<String>,
    pub final_status: FinalStatus,
    pub final_reviewer_id: Option<ReviewerId>,
    pub final_rejection_reason: Option<String>,
    pub final_admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub financial_reviewed_at: Option<DateTime<Utc>>,
    pub final_reviewed_at: Option<DateTime<Utc>>,
    /// Set while a final approval still owes its membership activation.
    #[serde(default)]
    pub activation_pending: bool,
    /// Optimistic concurrency counter, bumped by the store on every update.
    pub version: u64,
}

impl Transaction {
    /// Fresh record in the initial `Pending`/`Pending` state.
    pub fn open(id: TransactionId, submission: NewTransaction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            entity_type: submission.entity_type,
            entity_reference: submission.entity_reference,
            amount: submission.amount,
            payment_status: submission.payment_status,
            financial_status: FinancialStatus::Pending,
            financial_reviewer_id: None,
            financial_rejection_reason: None,
            financial_admin_notes: None,
            final_status: FinalStatus::Pending,
            final_reviewer_id: None,
            final_rejection_reason: None,
            final_admin_notes: None,
            created_at,
            financial_reviewed_at: None,
            final_reviewed_at: None,
            activation_pending: false,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.financial_status {
            FinancialStatus::Rejected => true,
            FinancialStatus::Approved => self.final_status != FinalStatus::Pending,
            FinancialStatus::Pending | FinancialStatus::UnderReview => false,
        }
    }

    /// Stage the transaction is currently waiting on, if any.
    pub fn current_stage(&self) -> Option<ReviewStage> {
        if self.financial_status.is_open() {
            Some(ReviewStage::Financial)
        } else if self.financial_status == FinancialStatus::Approved
            && self.final_status == FinalStatus::Pending
        {
            Some(ReviewStage::Final)
        } else {
            None
        }
    }
}
