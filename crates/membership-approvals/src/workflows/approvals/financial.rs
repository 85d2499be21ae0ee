use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::audit::{AuditAction, AuditEmitter, AuditEvent};
use super::domain::{
    FinancialStatus, ReviewDecision, ReviewStage, ReviewSubmission, ReviewerId, Transaction,
    TransactionId,
};
use super::error::ApprovalError;
use super::repository::{
    load_transaction, persist_transaction, TransactionQuery, TransactionRepository,
};

/// Gates transactions on proof of correct payment.
pub struct FinancialReviewEngine<R, A> {
    repository: Arc<R>,
    audit: Arc<A>,
}

impl<R, A> FinancialReviewEngine<R, A>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
{
    pub fn new(repository: Arc<R>, audit: Arc<A>) -> Self {
        Self { repository, audit }
    }

    /// Pending and claimed transactions, oldest first. Any financial reviewer may pick up
    /// any item, so `reviewer_id` only scopes the log line.
    pub fn list_for_review(
        &self,
        reviewer_id: ReviewerId,
    ) -> Result<Vec<Transaction>, ApprovalError> {
        let query =
            TransactionQuery::financial(&[FinancialStatus::Pending, FinancialStatus::UnderReview]);
        let mut records = self.repository.query(&query)?;
        records.retain(|record| record.financial_status.is_open());
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        debug!(%reviewer_id, count = records.len(), "financial review queue loaded");
        Ok(records)
    }

    /// Claim a pending transaction for review.
    pub fn start_review(
        &self,
        id: &TransactionId,
        reviewer_id: ReviewerId,
    ) -> Result<Transaction, ApprovalError> {
        let mut record = load_transaction(self.repository.as_ref(), id)?;
        if record.financial_status != FinancialStatus::Pending {
            warn!(transaction_id = %id, status = record.financial_status.label(), "cannot start financial review");
            return Err(ApprovalError::InvalidState(format!(
                "financial review of {id} cannot start from status {}",
                record.financial_status.label()
            )));
        }

        record.financial_status = FinancialStatus::UnderReview;
        record.financial_reviewer_id = Some(reviewer_id);
        let stored = persist_transaction(self.repository.as_ref(), record)?;

        info!(transaction_id = %id, %reviewer_id, "financial review started");
        self.audit.emit(AuditEvent {
            transaction_id: id.clone(),
            stage: ReviewStage::Financial,
            action: AuditAction::FinancialReviewStarted,
            reviewer_id,
            from_status: FinancialStatus::Pending.label().to_string(),
            to_status: FinancialStatus::UnderReview.label().to_string(),
            reason: None,
            notes: None,
            automatic: false,
            occurred_at: Utc::now(),
        })?;
        Ok(stored)
    }

    /// Hand a claimed transaction over to another financial reviewer.
    pub fn reassign_review(
        &self,
        id: &TransactionId,
        reviewer_id: ReviewerId,
    ) -> Result<Transaction, ApprovalError> {
        let mut record = load_transaction(self.repository.as_ref(), id)?;
        if record.financial_status != FinancialStatus::UnderReview {
            return Err(ApprovalError::InvalidState(format!(
                "financial review of {id} is {}, only claimed reviews can be reassigned",
                record.financial_status.label()
            )));
        }
        let previous = record.financial_reviewer_id;
        if previous == Some(reviewer_id) {
            return Err(ApprovalError::InvalidState(format!(
                "financial review of {id} is already claimed by reviewer {reviewer_id}"
            )));
        }

        record.financial_reviewer_id = Some(reviewer_id);
        let stored = persist_transaction(self.repository.as_ref(), record)?;

        info!(transaction_id = %id, %reviewer_id, previous = ?previous, "financial review reassigned");
        self.audit.emit(AuditEvent {
            transaction_id: id.clone(),
            stage: ReviewStage::Financial,
            action: AuditAction::FinancialReviewReassigned,
            reviewer_id,
            from_status: FinancialStatus::UnderReview.label().to_string(),
            to_status: FinancialStatus::UnderReview.label().to_string(),
            reason: None,
            notes: previous.map(|owner| format!("previously claimed by reviewer {owner}")),
            automatic: false,
            occurred_at: Utc::now(),
        })?;
        Ok(stored)
    }

    /// Record the financial decision for a pending or claimed transaction.
    pub fn complete_review(
        &self,
        id: &TransactionId,
        reviewer_id: ReviewerId,
        submission: ReviewSubmission,
    ) -> Result<Transaction, ApprovalError> {
        self.decide(id, reviewer_id, submission, false)
    }

    pub(crate) fn complete_automatically(
        &self,
        id: &TransactionId,
        system_reviewer: ReviewerId,
        notes: String,
    ) -> Result<Transaction, ApprovalError> {
        self.decide(
            id,
            system_reviewer,
            ReviewSubmission::approve().with_notes(notes),
            true,
        )
    }

    fn decide(
        &self,
        id: &TransactionId,
        reviewer_id: ReviewerId,
        submission: ReviewSubmission,
        automatic: bool,
    ) -> Result<Transaction, ApprovalError> {
        let reason = validated_reason(&submission, "financial_rejection_reason")?;
        let mut record = load_transaction(self.repository.as_ref(), id)?;

        let from = record.financial_status;
        match from {
            FinancialStatus::Pending => {}
            FinancialStatus::UnderReview => {
                if let Some(owner) = record.financial_reviewer_id {
                    if owner != reviewer_id {
                        return Err(ApprovalError::InvalidState(format!(
                            "financial review of {id} is claimed by reviewer {owner}"
                        )));
                    }
                }
            }
            FinancialStatus::Approved | FinancialStatus::Rejected => {
                warn!(transaction_id = %id, status = from.label(), "financial review already decided");
                return Err(ApprovalError::InvalidState(format!(
                    "financial review of {id} is already {}",
                    from.label()
                )));
            }
        }

        let (to, action) = match submission.decision {
            ReviewDecision::Approved => (FinancialStatus::Approved, AuditAction::FinancialApproved),
            ReviewDecision::Rejected => (FinancialStatus::Rejected, AuditAction::FinancialRejected),
        };
        let notes = normalized_notes(submission.notes);

        record.financial_status = to;
        record.financial_reviewer_id = Some(reviewer_id);
        record.financial_rejection_reason = reason.clone();
        record.financial_admin_notes = notes.clone();
        record.financial_reviewed_at = Some(Utc::now());
        let stored = persist_transaction(self.repository.as_ref(), record)?;

        info!(
            transaction_id = %id,
            %reviewer_id,
            decision = submission.decision.label(),
            automatic,
            "financial review completed"
        );
        self.audit.emit(AuditEvent {
            transaction_id: id.clone(),
            stage: ReviewStage::Financial,
            action,
            reviewer_id,
            from_status: from.label().to_string(),
            to_status: to.label().to_string(),
            reason,
            notes,
            automatic,
            occurred_at: Utc::now(),
        })?;
        Ok(stored)
    }
}

/// Rejections must carry a non-blank reason; approvals drop any stray reason.
pub(crate) fn validated_reason(
    submission: &ReviewSubmission,
    field: &str,
) -> Result<Option<String>, ApprovalError> {
    match submission.decision {
        ReviewDecision::Approved => Ok(None),
        ReviewDecision::Rejected => submission
            .reason()
            .map(|reason| Some(reason.to_string()))
            .ok_or_else(|| ApprovalError::Validation(format!("{field} is required when rejecting"))),
    }
}

pub(crate) fn normalized_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty())
}
