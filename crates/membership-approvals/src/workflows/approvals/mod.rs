//! Two-tier approval workflow for membership applications and renewals.
//!
//! A transaction first passes financial review (was the payment received and correct?)
//! and only then final administrative review (grant the membership or not). Each stage
//! is owned by its own engine; the orchestrator sequences them and answers the
//! cross-stage questions clients ask.

pub mod access;
pub mod activation;
pub mod audit;
pub mod domain;
pub mod error;
pub mod final_review;
pub mod financial;
pub mod orchestrator;
pub mod policy;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use access::{ReviewerContext, Role};
pub use activation::{ActivationError, ActivationRequest, MembershipActivator};
pub use audit::{AuditAction, AuditEmitter, AuditError, AuditEvent};
pub use domain::{
    EntityType, FinalStatus, FinancialStatus, NewTransaction, PaymentStatus, ReviewDecision,
    ReviewStage, ReviewSubmission, ReviewerId, Transaction, TransactionId,
};
pub use error::ApprovalError;
pub use final_review::FinalReviewEngine;
pub use financial::FinancialReviewEngine;
pub use orchestrator::{
    ApprovalOrchestrator, ApprovalStatistics, BulkApprovalReport, BulkItemOutcome,
    ReadinessStatus,
};
pub use policy::{ApprovalSettings, AutoApprovalPolicy, ReviewPolicy};
pub use repository::{RepositoryError, TransactionQuery, TransactionRepository};
pub use router::approval_router;
