use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::activation::{ActivationRequest, MembershipActivator};
use super::audit::{AuditAction, AuditEmitter, AuditEvent};
use super::domain::{
    FinalStatus, FinancialStatus, ReviewDecision, ReviewStage, ReviewSubmission, ReviewerId,
    Transaction, TransactionId,
};
use super::error::ApprovalError;
use super::financial::{normalized_notes, validated_reason};
use super::policy::ReviewPolicy;
use super::repository::{
    load_transaction, persist_transaction, TransactionQuery, TransactionRepository,
};

/// Final administrative decision, only reachable once payment has been approved.
pub struct FinalReviewEngine<R, A, M> {
    repository: Arc<R>,
    audit: Arc<A>,
    activator: Arc<M>,
    policy: ReviewPolicy,
}

impl<R, A, M> FinalReviewEngine<R, A, M>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    pub fn new(repository: Arc<R>, audit: Arc<A>, activator: Arc<M>, policy: ReviewPolicy) -> Self {
        Self {
            repository,
            audit,
            activator,
            policy,
        }
    }

    pub fn list_for_review(&self) -> Result<Vec<Transaction>, ApprovalError> {
        let query = TransactionQuery::financial(&[FinancialStatus::Approved])
            .with_final(&[FinalStatus::Pending]);
        let mut records = self.repository.query(&query)?;
        records.retain(|record| {
            record.financial_status == FinancialStatus::Approved
                && record.final_status == FinalStatus::Pending
        });
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        debug!(count = records.len(), "final review queue loaded");
        Ok(records)
    }

    pub fn complete_review(
        &self,
        id: &TransactionId,
        reviewer_id: ReviewerId,
        submission: ReviewSubmission,
    ) -> Result<Transaction, ApprovalError> {
        let reason = validated_reason(&submission, "rejection_reason")?;
        let mut record = load_transaction(self.repository.as_ref(), id)?;

        if record.financial_status != FinancialStatus::Approved {
            warn!(transaction_id = %id, financial_status = record.financial_status.label(), "final review before financial approval");
            return Err(ApprovalError::Precondition(format!(
                "final review of {id} requires financial approval (financial status is {})",
                record.financial_status.label()
            )));
        }
        if record.final_status != FinalStatus::Pending {
            return Err(ApprovalError::InvalidState(format!(
                "final review of {id} is already {}",
                record.final_status.label()
            )));
        }
        if !self.policy.allow_self_approval && record.financial_reviewer_id == Some(reviewer_id) {
            return Err(ApprovalError::Authorization(format!(
                "reviewer {reviewer_id} performed the financial review of {id} and cannot also record the final decision"
            )));
        }

        let (to, action) = match submission.decision {
            ReviewDecision::Approved => (FinalStatus::Approved, AuditAction::FinalApproved),
            ReviewDecision::Rejected => (FinalStatus::Rejected, AuditAction::FinalRejected),
        };
        let notes = normalized_notes(submission.notes);

        record.final_status = to;
        record.final_reviewer_id = Some(reviewer_id);
        record.final_rejection_reason = reason.clone();
        record.final_admin_notes = notes.clone();
        record.final_reviewed_at = Some(Utc::now());
        record.activation_pending = to == FinalStatus::Approved;
        let stored = persist_transaction(self.repository.as_ref(), record)?;

        info!(
            transaction_id = %id,
            %reviewer_id,
            decision = submission.decision.label(),
            "final review completed"
        );

        // The decision is stored, so activation and audit both run whatever the other returns.
        let activated = if stored.activation_pending {
            self.activate(stored)
        } else {
            Ok(stored)
        };
        let audited = self.audit.emit(AuditEvent {
            transaction_id: id.clone(),
            stage: ReviewStage::Final,
            action,
            reviewer_id,
            from_status: FinalStatus::Pending.label().to_string(),
            to_status: to.label().to_string(),
            reason,
            notes,
            automatic: false,
            occurred_at: Utc::now(),
        });

        match (activated, audited) {
            (Ok(stored), Ok(())) => Ok(stored),
            (Ok(_), Err(audit_error)) => {
                error!(transaction_id = %id, error = %audit_error, "final decision stored but audit emit failed");
                Err(audit_error.into())
            }
            (Err(activation_error), audited) => {
                if let Err(audit_error) = audited {
                    error!(transaction_id = %id, error = %audit_error, "final decision stored but audit emit failed");
                }
                Err(activation_error)
            }
        }
    }

    /// Re-run the activation hook for an approved membership whose activation failed.
    pub fn retry_activation(&self, id: &TransactionId) -> Result<Transaction, ApprovalError> {
        let record = load_transaction(self.repository.as_ref(), id)?;
        if record.final_status != FinalStatus::Approved || !record.activation_pending {
            return Err(ApprovalError::InvalidState(format!(
                "transaction {id} has no pending membership activation (final status is {})",
                record.final_status.label()
            )));
        }
        self.activate(record)
    }

    /// Calls the activator, then clears `activation_pending`. On failure the flag stays set.
    fn activate(&self, mut record: Transaction) -> Result<Transaction, ApprovalError> {
        let approved_by = record.final_reviewer_id.ok_or_else(|| {
            ApprovalError::InvalidState(format!(
                "transaction {} has no final reviewer to activate under",
                record.id
            ))
        })?;
        let request = ActivationRequest {
            transaction_id: record.id.clone(),
            entity_type: record.entity_type,
            entity_reference: record.entity_reference.clone(),
            approved_by,
        };
        if let Err(activation_error) = self.activator.activate(request) {
            warn!(transaction_id = %record.id, error = %activation_error, "membership activation failed, left pending");
            return Err(activation_error.into());
        }
        info!(transaction_id = %record.id, entity = record.entity_type.label(), "membership activation requested");

        record.activation_pending = false;
        persist_transaction(self.repository.as_ref(), record)
    }
}
