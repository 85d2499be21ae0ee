use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::access::ReviewerContext;
use super::activation::MembershipActivator;
use super::audit::{AuditAction, AuditEmitter, AuditEvent};
use super::domain::{
    FinalStatus, FinancialStatus, NewTransaction, PaymentStatus, ReviewStage, ReviewSubmission,
    ReviewerId, Transaction, TransactionId,
};
use super::error::ApprovalError;
use super::final_review::FinalReviewEngine;
use super::financial::{normalized_notes, FinancialReviewEngine};
use super::policy::{ApprovalSettings, AutoApprovalPolicy};
use super::repository::{
    load_transaction, persist_transaction, TransactionQuery, TransactionRepository,
};

/// Which actions a client may offer for a transaction right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessStatus {
    pub transaction_id: TransactionId,
    pub ready_for_financial: bool,
    pub ready_for_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
    pub financial_status: &'static str,
    pub final_status: &'static str,
}

/// Per-item result inside a bulk report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemOutcome {
    pub transaction_id: TransactionId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ReviewStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkApprovalReport {
    pub successful: usize,
    pub failed: usize,
    pub details: Vec<BulkItemOutcome>,
}

impl BulkApprovalReport {
    fn record(&mut self, id: &TransactionId, result: Result<ReviewStage, ApprovalError>) {
        let outcome = match result {
            Ok(stage) => {
                self.successful += 1;
                BulkItemOutcome {
                    transaction_id: id.clone(),
                    success: true,
                    stage: Some(stage),
                    error_kind: None,
                    message: format!("{} review approved", stage.label()),
                }
            }
            Err(error) => {
                self.failed += 1;
                BulkItemOutcome {
                    transaction_id: id.clone(),
                    success: false,
                    stage: None,
                    error_kind: Some(error.kind()),
                    message: error.to_string(),
                }
            }
        };
        self.details.push(outcome);
    }
}

/// Counts backing the reviewer dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalStatistics {
    pub total: usize,
    pub financial_pending: usize,
    pub financial_under_review: usize,
    pub financial_approved: usize,
    pub financial_rejected: usize,
    pub awaiting_final_review: usize,
    pub final_approved: usize,
    pub final_rejected: usize,
    /// Approved memberships whose activation has not gone through yet.
    pub activation_pending: usize,
    /// Sum of amounts still waiting on a financial decision.
    pub pending_review_amount: Decimal,
}

/// Coordinates the two review engines and exposes the cross-stage queries.
pub struct ApprovalOrchestrator<R, A, M> {
    repository: Arc<R>,
    audit: Arc<A>,
    financial: FinancialReviewEngine<R, A>,
    final_review: FinalReviewEngine<R, A, M>,
    auto_approval: AutoApprovalPolicy,
}

impl<R, A, M> ApprovalOrchestrator<R, A, M>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    pub fn new(
        repository: Arc<R>,
        audit: Arc<A>,
        activator: Arc<M>,
        settings: ApprovalSettings,
    ) -> Self {
        let financial = FinancialReviewEngine::new(repository.clone(), audit.clone());
        let final_review =
            FinalReviewEngine::new(repository.clone(), audit.clone(), activator, settings.review);
        Self {
            repository,
            audit,
            financial,
            final_review,
            auto_approval: settings.auto_approval,
        }
    }

    pub fn financial(&self) -> &FinancialReviewEngine<R, A> {
        &self.financial
    }

    pub fn final_review(&self) -> &FinalReviewEngine<R, A, M> {
        &self.final_review
    }

    pub fn auto_approval_policy(&self) -> &AutoApprovalPolicy {
        &self.auto_approval
    }

    /// Open a transaction for a submitted payment, auto-approving it when policy allows.
    pub fn record_payment(&self, submission: NewTransaction) -> Result<Transaction, ApprovalError> {
        if submission.amount <= Decimal::ZERO {
            return Err(ApprovalError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if submission.entity_reference.trim().is_empty() {
            return Err(ApprovalError::Validation(
                "entity_reference is required".to_string(),
            ));
        }

        let id = self.repository.next_id()?;
        let stored = self
            .repository
            .insert(Transaction::open(id, submission, Utc::now()))?;
        info!(
            transaction_id = %stored.id,
            entity = stored.entity_type.label(),
            amount = %stored.amount,
            "payment recorded"
        );

        Ok(self.try_auto_approve(stored))
    }

    /// Record a gateway or manual verification outcome while financial review is open.
    pub fn update_payment_status(
        &self,
        id: &TransactionId,
        payment_status: PaymentStatus,
        reviewer_id: ReviewerId,
    ) -> Result<Transaction, ApprovalError> {
        let mut record = load_transaction(self.repository.as_ref(), id)?;
        if !record.financial_status.is_open() {
            return Err(ApprovalError::InvalidState(format!(
                "payment status of {id} is locked once financial review is {}",
                record.financial_status.label()
            )));
        }
        let from = record.payment_status;
        if from == payment_status {
            return Ok(record);
        }

        record.payment_status = payment_status;
        let stored = persist_transaction(self.repository.as_ref(), record)?;
        info!(
            transaction_id = %id,
            from = from.label(),
            to = payment_status.label(),
            "payment status updated"
        );
        let audited = self.audit.emit(AuditEvent {
            transaction_id: id.clone(),
            stage: ReviewStage::Financial,
            action: AuditAction::PaymentStatusChanged,
            reviewer_id,
            from_status: from.label().to_string(),
            to_status: payment_status.label().to_string(),
            reason: None,
            notes: None,
            automatic: false,
            occurred_at: Utc::now(),
        });

        // Auto-approval runs even when the audit emit failed.
        let stored = self.try_auto_approve(stored);
        if let Err(audit_error) = audited {
            error!(transaction_id = %id, error = %audit_error, "payment status stored but audit emit failed");
            return Err(audit_error.into());
        }
        Ok(stored)
    }

    pub fn get(&self, id: &TransactionId) -> Result<Transaction, ApprovalError> {
        load_transaction(self.repository.as_ref(), id)
    }

    pub fn readiness(&self, id: &TransactionId) -> Result<ReadinessStatus, ApprovalError> {
        let record = load_transaction(self.repository.as_ref(), id)?;
        Ok(readiness_of(&record))
    }

    /// Approve each transaction at whichever stage it is eligible for. Failures are
    /// reported per item and never abort the batch.
    pub fn bulk_approve(
        &self,
        ids: &[TransactionId],
        reviewer: &ReviewerContext,
        notes: Option<String>,
    ) -> BulkApprovalReport {
        let notes = normalized_notes(notes);
        let mut seen = HashSet::new();
        let mut report = BulkApprovalReport::default();

        for id in ids {
            if !seen.insert(id.clone()) {
                report.record(
                    id,
                    Err(ApprovalError::Validation(format!(
                        "transaction {id} is listed more than once"
                    ))),
                );
                continue;
            }
            let result = self.approve_current_stage(id, reviewer, notes.clone());
            if let Err(error) = &result {
                warn!(transaction_id = %id, reviewer_id = %reviewer.reviewer_id, %error, "bulk approval item failed");
            }
            report.record(id, result);
        }

        info!(
            reviewer_id = %reviewer.reviewer_id,
            successful = report.successful,
            failed = report.failed,
            "bulk approval finished"
        );
        report
    }

    fn approve_current_stage(
        &self,
        id: &TransactionId,
        reviewer: &ReviewerContext,
        notes: Option<String>,
    ) -> Result<ReviewStage, ApprovalError> {
        let record = load_transaction(self.repository.as_ref(), id)?;
        let stage = record.current_stage().ok_or_else(|| {
            ApprovalError::InvalidState(format!(
                "transaction {id} is closed (financial {}, final {})",
                record.financial_status.label(),
                record.final_status.label()
            ))
        })?;
        reviewer.require_stage(stage)?;

        let mut submission = ReviewSubmission::approve();
        submission.notes = notes;
        match stage {
            ReviewStage::Financial => {
                self.financial
                    .complete_review(id, reviewer.reviewer_id, submission)?;
            }
            ReviewStage::Final => {
                self.final_review
                    .complete_review(id, reviewer.reviewer_id, submission)?;
            }
        }
        Ok(stage)
    }

    pub fn retry_activation(&self, id: &TransactionId) -> Result<Transaction, ApprovalError> {
        self.final_review.retry_activation(id)
    }

    /// Apply the auto-approval policy to one transaction.
    pub fn auto_approve(&self, id: &TransactionId) -> Result<Transaction, ApprovalError> {
        let record = load_transaction(self.repository.as_ref(), id)?;
        if let Some(reason) = self.auto_approval.ineligibility(&record) {
            return Err(ApprovalError::Precondition(format!(
                "transaction {id} is not eligible for auto-approval: {reason}"
            )));
        }
        self.financial.complete_automatically(
            id,
            self.auto_approval.system_reviewer,
            auto_approval_note(&self.auto_approval),
        )
    }

    /// Sweep the financial queue and auto-approve every eligible transaction.
    pub fn run_auto_approval(&self) -> Result<BulkApprovalReport, ApprovalError> {
        let mut report = BulkApprovalReport::default();
        if !self.auto_approval.enabled {
            return Ok(report);
        }

        let candidates = self
            .financial
            .list_for_review(self.auto_approval.system_reviewer)?;
        for record in candidates
            .iter()
            .filter(|record| self.auto_approval.is_eligible(record))
        {
            let result = self
                .financial
                .complete_automatically(
                    &record.id,
                    self.auto_approval.system_reviewer,
                    auto_approval_note(&self.auto_approval),
                )
                .map(|_| ReviewStage::Financial);
            report.record(&record.id, result);
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "auto-approval sweep finished"
        );
        Ok(report)
    }

    pub fn statistics(&self) -> Result<ApprovalStatistics, ApprovalError> {
        let records = self.repository.query(&TransactionQuery::default())?;
        let mut stats = ApprovalStatistics {
            total: records.len(),
            ..ApprovalStatistics::default()
        };

        for record in &records {
            match record.financial_status {
                FinancialStatus::Pending => stats.financial_pending += 1,
                FinancialStatus::UnderReview => stats.financial_under_review += 1,
                FinancialStatus::Approved => stats.financial_approved += 1,
                FinancialStatus::Rejected => stats.financial_rejected += 1,
            }
            if record.financial_status.is_open() {
                stats.pending_review_amount += record.amount;
            }
            if record.financial_status == FinancialStatus::Approved {
                match record.final_status {
                    FinalStatus::Pending => stats.awaiting_final_review += 1,
                    FinalStatus::Approved => stats.final_approved += 1,
                    FinalStatus::Rejected => stats.final_rejected += 1,
                }
            }
            if record.activation_pending {
                stats.activation_pending += 1;
            }
        }

        Ok(stats)
    }

    /// Best effort: the caller's write has already landed, so a failed auto-approval is
    /// logged and the latest stored copy is returned instead.
    fn try_auto_approve(&self, record: Transaction) -> Transaction {
        if !self.auto_approval.is_eligible(&record) {
            return record;
        }
        match self.financial.complete_automatically(
            &record.id,
            self.auto_approval.system_reviewer,
            auto_approval_note(&self.auto_approval),
        ) {
            Ok(approved) => approved,
            Err(auto_error) => {
                warn!(transaction_id = %record.id, error = %auto_error, "auto-approval failed, transaction left as stored");
                self.repository
                    .fetch(&record.id)
                    .ok()
                    .flatten()
                    .unwrap_or(record)
            }
        }
    }
}

fn auto_approval_note(policy: &AutoApprovalPolicy) -> String {
    format!("auto-approved: amount within limit {}", policy.max_amount)
}

fn readiness_of(record: &Transaction) -> ReadinessStatus {
    let blocking_reason = match (record.financial_status, record.final_status) {
        (FinancialStatus::Pending, _) => Some(match record.payment_status {
            PaymentStatus::Failed | PaymentStatus::Cancelled => format!(
                "awaiting financial review; payment is {}",
                record.payment_status.label()
            ),
            _ => "awaiting financial review".to_string(),
        }),
        (FinancialStatus::UnderReview, _) => Some(match record.financial_reviewer_id {
            Some(owner) => format!("financial review in progress by reviewer {owner}"),
            None => "financial review in progress".to_string(),
        }),
        (FinancialStatus::Rejected, _) => Some(format!(
            "financial review rejected: {}",
            record
                .financial_rejection_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        )),
        (FinancialStatus::Approved, FinalStatus::Pending) => None,
        (FinancialStatus::Approved, FinalStatus::Approved) if record.activation_pending => {
            Some("membership approved, activation pending".to_string())
        }
        (FinancialStatus::Approved, FinalStatus::Approved) => {
            Some("membership already approved".to_string())
        }
        (FinancialStatus::Approved, FinalStatus::Rejected) => Some(format!(
            "final review rejected: {}",
            record
                .final_rejection_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        )),
    };

    ReadinessStatus {
        transaction_id: record.id.clone(),
        ready_for_financial: record.financial_status.is_open(),
        ready_for_final: record.current_stage() == Some(ReviewStage::Final),
        blocking_reason,
        financial_status: record.financial_status.label(),
        final_status: record.final_status.label(),
    }
}
