use super::common::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::workflows::approvals::access::{ReviewerContext, Role};
use crate::workflows::approvals::audit::AuditAction;
use crate::workflows::approvals::domain::{
    FinalStatus, FinancialStatus, PaymentStatus, ReviewStage, ReviewSubmission, ReviewerId,
    TransactionId,
};
use crate::workflows::approvals::policy::{ApprovalSettings, AutoApprovalPolicy};
use crate::workflows::approvals::{ApprovalError, ApprovalOrchestrator};

const SYSTEM: ReviewerId = ReviewerId(1);

fn auto_settings() -> ApprovalSettings {
    ApprovalSettings {
        auto_approval: AutoApprovalPolicy {
            enabled: true,
            max_amount: Decimal::new(100, 0),
            require_gateway_confirmation: true,
            entity_types: Vec::new(),
            system_reviewer: SYSTEM,
        },
        ..ApprovalSettings::default()
    }
}

#[test]
fn walks_transaction_through_both_tiers() {
    let (orchestrator, _repository, audit, activator) =
        build_orchestrator(ApprovalSettings::default());
    let record = orchestrator
        .record_payment(new_transaction(150, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(record.financial_status, FinancialStatus::Pending);
    assert_eq!(record.final_status, FinalStatus::Pending);
    let id = record.id.clone();

    let claimed = orchestrator
        .financial()
        .start_review(&id, FINANCIAL_REVIEWER)
        .expect("start succeeds");
    assert_eq!(claimed.financial_status, FinancialStatus::UnderReview);
    assert_eq!(claimed.financial_reviewer_id, Some(FINANCIAL_REVIEWER));

    orchestrator
        .financial()
        .complete_review(&id, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("financial approval succeeds");
    let final_queue = orchestrator
        .final_review()
        .list_for_review()
        .expect("final queue loads");
    assert!(final_queue.iter().any(|item| item.id == id));

    let done = orchestrator
        .final_review()
        .complete_review(&id, ADMIN, ReviewSubmission::approve())
        .expect("final approval succeeds");
    assert_eq!(done.final_status, FinalStatus::Approved);
    assert_eq!(activator.requests().len(), 1);

    let actions: Vec<AuditAction> = audit.events().iter().map(|event| event.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::FinancialReviewStarted,
            AuditAction::FinancialApproved,
            AuditAction::FinalApproved,
        ]
    );
}

#[test]
fn readiness_explains_each_gate() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    let id = seed(&repository, "ready", 150, 0);

    let status = orchestrator.readiness(&id).expect("readiness loads");
    assert!(status.ready_for_financial);
    assert!(!status.ready_for_final);
    assert_eq!(
        status.blocking_reason.as_deref(),
        Some("awaiting financial review")
    );

    orchestrator
        .financial()
        .start_review(&id, FINANCIAL_REVIEWER)
        .expect("start succeeds");
    let status = orchestrator.readiness(&id).expect("readiness loads");
    assert!(status
        .blocking_reason
        .as_deref()
        .unwrap_or_default()
        .contains("reviewer 7"));

    orchestrator
        .financial()
        .complete_review(&id, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("approve succeeds");
    let status = orchestrator.readiness(&id).expect("readiness loads");
    assert!(!status.ready_for_financial);
    assert!(status.ready_for_final);
    assert!(status.blocking_reason.is_none());

    let rejected = seed(&repository, "rejected", 150, 1);
    orchestrator
        .financial()
        .complete_review(&rejected, FINANCIAL_REVIEWER, ReviewSubmission::reject("chargeback"))
        .expect("reject succeeds");
    let status = orchestrator.readiness(&rejected).expect("readiness loads");
    assert!(!status.ready_for_financial && !status.ready_for_final);
    assert!(status
        .blocking_reason
        .as_deref()
        .unwrap_or_default()
        .contains("chargeback"));
}

#[test]
fn bulk_approve_reports_per_item_failures() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    let a = seed(&repository, "a", 150, 0);
    let b = seed(&repository, "b", 150, 1);
    let c = seed(&repository, "c", 150, 2);
    orchestrator
        .financial()
        .complete_review(&b, FINANCIAL_REVIEWER, ReviewSubmission::reject("duplicate payment"))
        .expect("reject succeeds");

    let report = orchestrator.bulk_approve(
        &[a.clone(), b.clone(), c.clone()],
        &financial_reviewer(),
        Some("batch verified".to_string()),
    );

    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.details.len(), 3);
    assert!(report.details[0].success);
    assert_eq!(report.details[0].stage, Some(ReviewStage::Financial));
    assert!(!report.details[1].success);
    assert_eq!(report.details[1].transaction_id, b);
    assert_eq!(report.details[1].error_kind, Some("invalid_state"));
    assert!(report.details[2].success);

    assert_eq!(stored(&repository, &a).financial_status, FinancialStatus::Approved);
    assert_eq!(
        stored(&repository, &a).financial_admin_notes.as_deref(),
        Some("batch verified")
    );
    assert_eq!(stored(&repository, &b).financial_status, FinancialStatus::Rejected);
    assert_eq!(stored(&repository, &c).financial_status, FinancialStatus::Approved);
}

#[test]
fn bulk_approve_checks_role_for_each_stage() {
    let (orchestrator, repository, _, activator) =
        build_orchestrator(ApprovalSettings::default());
    let financial_stage = seed(&repository, "fin", 150, 0);
    let final_stage = seed(&repository, "final", 150, 1);
    orchestrator
        .financial()
        .complete_review(&final_stage, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("approve succeeds");

    let report = orchestrator.bulk_approve(
        &[financial_stage.clone(), final_stage.clone()],
        &admin(),
        None,
    );
    assert_eq!(report.successful, 1);
    assert_eq!(report.details[0].error_kind, Some("authorization"));
    assert_eq!(report.details[1].stage, Some(ReviewStage::Final));
    assert_eq!(activator.requests().len(), 1);
    assert_eq!(
        stored(&repository, &financial_stage).financial_status,
        FinancialStatus::Pending
    );
}

#[test]
fn bulk_approve_does_not_advance_a_repeated_id_twice() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    let id = seed(&repository, "repeat", 150, 0);
    let reviewer = ReviewerContext::new(
        ReviewerId(11),
        [Role::FinancialReviewer, Role::SuperAdmin],
    );

    let report = orchestrator.bulk_approve(&[id.clone(), id.clone()], &reviewer, None);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.details[1].error_kind, Some("validation"));
    assert_eq!(stored(&repository, &id).final_status, FinalStatus::Pending);
}

#[test]
fn bulk_approve_reports_missing_transactions() {
    let (orchestrator, _, _, _) = build_orchestrator(ApprovalSettings::default());
    let report = orchestrator.bulk_approve(
        &[TransactionId("txn-ghost".to_string())],
        &financial_reviewer(),
        None,
    );
    assert_eq!(report.failed, 1);
    assert_eq!(report.details[0].error_kind, Some("not_found"));
}

#[test]
fn record_payment_validates_submission() {
    let (orchestrator, _, _, _) = build_orchestrator(ApprovalSettings::default());

    assert!(matches!(
        orchestrator.record_payment(new_transaction(0, PaymentStatus::Completed)),
        Err(ApprovalError::Validation(_))
    ));

    let mut blank = new_transaction(25, PaymentStatus::Completed);
    blank.entity_reference = "  ".to_string();
    assert!(matches!(
        orchestrator.record_payment(blank),
        Err(ApprovalError::Validation(_))
    ));
}

#[test]
fn small_confirmed_payments_are_auto_approved() {
    let (orchestrator, _, audit, _) = build_orchestrator(auto_settings());

    let record = orchestrator
        .record_payment(new_transaction(50, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(record.financial_status, FinancialStatus::Approved);
    assert_eq!(record.financial_reviewer_id, Some(SYSTEM));
    assert_eq!(record.final_status, FinalStatus::Pending);

    let event = audit.events().pop().expect("auto approval audited");
    assert!(event.automatic);
    assert_eq!(event.action, AuditAction::FinancialApproved);
    assert_eq!(event.reviewer_id, SYSTEM);
}

#[test]
fn ineligible_payments_wait_for_manual_review() {
    let (orchestrator, _, _, _) = build_orchestrator(auto_settings());

    let large = orchestrator
        .record_payment(new_transaction(500, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(large.financial_status, FinancialStatus::Pending);
    match orchestrator.auto_approve(&large.id) {
        Err(ApprovalError::Precondition(message)) => assert!(message.contains("exceeds")),
        other => panic!("expected precondition failure, got {other:?}"),
    }

    let unconfirmed = orchestrator
        .record_payment(new_transaction(50, PaymentStatus::Processing))
        .expect("payment recorded");
    assert_eq!(unconfirmed.financial_status, FinancialStatus::Pending);

    let confirmed = orchestrator
        .update_payment_status(&unconfirmed.id, PaymentStatus::Completed, ADMIN)
        .expect("payment status updated");
    assert_eq!(confirmed.financial_status, FinancialStatus::Approved);
    assert_eq!(confirmed.payment_status, PaymentStatus::Completed);
}

#[test]
fn auto_approval_sweep_approves_only_eligible_items() {
    let (orchestrator, repository, _, _) = build_orchestrator(auto_settings());
    let small = seed(&repository, "small", 60, 0);
    let large = seed(&repository, "large", 600, 1);
    let claimed = seed(&repository, "claimed", 40, 2);
    orchestrator
        .financial()
        .start_review(&claimed, FINANCIAL_REVIEWER)
        .expect("start succeeds");

    let report = orchestrator.run_auto_approval().expect("sweep runs");
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.details[0].transaction_id, small);
    assert_eq!(stored(&repository, &large).financial_status, FinancialStatus::Pending);
    assert_eq!(
        stored(&repository, &claimed).financial_status,
        FinancialStatus::UnderReview
    );
}

#[test]
fn disabled_policy_never_auto_approves() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    let id = seed(&repository, "disabled", 10, 0);

    let report = orchestrator.run_auto_approval().expect("sweep runs");
    assert_eq!(report.successful, 0);
    assert!(matches!(
        orchestrator.auto_approve(&id),
        Err(ApprovalError::Precondition(_))
    ));
}

#[test]
fn payment_status_is_locked_after_financial_decision() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    let id = seed(&repository, "locked", 150, 0);
    orchestrator
        .financial()
        .complete_review(&id, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("approve succeeds");

    assert!(matches!(
        orchestrator.update_payment_status(&id, PaymentStatus::Failed, ADMIN),
        Err(ApprovalError::InvalidState(_))
    ));
}

#[test]
fn statistics_count_each_status() {
    let (orchestrator, repository, _, _) = build_orchestrator(ApprovalSettings::default());
    seed(&repository, "pending", 100, 0);
    let claimed = seed(&repository, "claimed", 50, 1);
    let approved = seed(&repository, "approved", 70, 2);
    let rejected = seed(&repository, "rejected", 30, 3);
    orchestrator
        .financial()
        .start_review(&claimed, FINANCIAL_REVIEWER)
        .expect("start succeeds");
    orchestrator
        .financial()
        .complete_review(&approved, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("approve succeeds");
    orchestrator
        .financial()
        .complete_review(&rejected, FINANCIAL_REVIEWER, ReviewSubmission::reject("forged receipt"))
        .expect("reject succeeds");

    let stats = orchestrator.statistics().expect("stats load");
    assert_eq!(stats.total, 4);
    assert_eq!(stats.financial_pending, 1);
    assert_eq!(stats.financial_under_review, 1);
    assert_eq!(stats.financial_approved, 1);
    assert_eq!(stats.financial_rejected, 1);
    assert_eq!(stats.awaiting_final_review, 1);
    assert_eq!(stats.pending_review_amount, Decimal::new(150, 0));
}

#[test]
fn repository_assigns_transaction_ids() {
    let (orchestrator, repository, audit, activator) =
        build_orchestrator(ApprovalSettings::default());
    let first = orchestrator
        .record_payment(new_transaction(150, PaymentStatus::Completed))
        .expect("payment recorded");
    let second = orchestrator
        .record_payment(new_transaction(150, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(first.id, TransactionId("txn-000001".to_string()));
    assert_eq!(second.id, TransactionId("txn-000002".to_string()));

    // A fresh orchestrator over the same store continues the sequence.
    let restarted =
        ApprovalOrchestrator::new(repository, audit, activator, ApprovalSettings::default());
    let third = restarted
        .record_payment(new_transaction(150, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(third.id, TransactionId("txn-000003".to_string()));
    assert_eq!(restarted.statistics().expect("stats load").total, 3);
}

#[test]
fn record_payment_surfaces_id_allocation_failure() {
    let orchestrator = ApprovalOrchestrator::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryAudit::default()),
        Arc::new(MemoryActivator::default()),
        ApprovalSettings::default(),
    );
    assert!(matches!(
        orchestrator.record_payment(new_transaction(150, PaymentStatus::Completed)),
        Err(ApprovalError::Repository(_))
    ));
}

#[test]
fn auto_approval_audit_outage_keeps_recorded_payment() {
    let (orchestrator, repository, audit, _) = build_orchestrator(auto_settings());
    audit.fail(true);

    let record = orchestrator
        .record_payment(new_transaction(50, PaymentStatus::Completed))
        .expect("payment recorded despite audit outage");
    assert_eq!(record, stored(&repository, &record.id));
    assert_eq!(orchestrator.statistics().expect("stats load").total, 1);
    assert!(audit.events().is_empty());
}

#[test]
fn lost_auto_approval_race_returns_the_stored_payment() {
    let repository = Arc::new(RacingRepository::default());
    let audit = Arc::new(MemoryAudit::default());
    let orchestrator = ApprovalOrchestrator::new(
        repository.clone(),
        audit.clone(),
        Arc::new(MemoryActivator::default()),
        auto_settings(),
    );

    let record = orchestrator
        .record_payment(new_transaction(50, PaymentStatus::Completed))
        .expect("payment recorded");
    assert_eq!(record.financial_status, FinancialStatus::Pending);
    assert_eq!(
        record.financial_admin_notes.as_deref(),
        Some("written by another reviewer")
    );
    assert_eq!(record, stored(&repository.inner, &record.id));
    assert!(audit.events().is_empty());
}

#[test]
fn payment_confirmation_auto_approves_even_when_audit_fails() {
    let (orchestrator, _, audit, _) = build_orchestrator(auto_settings());
    let unconfirmed = orchestrator
        .record_payment(new_transaction(50, PaymentStatus::Processing))
        .expect("payment recorded");
    audit.fail(true);

    assert!(matches!(
        orchestrator.update_payment_status(&unconfirmed.id, PaymentStatus::Completed, ADMIN),
        Err(ApprovalError::Audit(_))
    ));
    let current = orchestrator.get(&unconfirmed.id).expect("record loads");
    assert_eq!(current.payment_status, PaymentStatus::Completed);
    assert_eq!(current.financial_status, FinancialStatus::Approved);
    assert_eq!(current.financial_reviewer_id, Some(SYSTEM));
}

#[test]
fn pending_activation_is_visible_until_retried() {
    let (orchestrator, repository, _, activator) = build_orchestrator(ApprovalSettings::default());
    let id = seed(&repository, "activation", 150, 0);
    orchestrator
        .financial()
        .complete_review(&id, FINANCIAL_REVIEWER, ReviewSubmission::approve())
        .expect("approve succeeds");
    activator.fail(true);
    assert!(matches!(
        orchestrator
            .final_review()
            .complete_review(&id, ADMIN, ReviewSubmission::approve()),
        Err(ApprovalError::Activation(_))
    ));

    let status = orchestrator.readiness(&id).expect("readiness loads");
    assert!(!status.ready_for_final);
    assert_eq!(
        status.blocking_reason.as_deref(),
        Some("membership approved, activation pending")
    );
    assert_eq!(orchestrator.statistics().expect("stats load").activation_pending, 1);

    activator.fail(false);
    orchestrator
        .retry_activation(&id)
        .expect("retry activates membership");
    assert_eq!(
        orchestrator.readiness(&id).expect("readiness loads").blocking_reason.as_deref(),
        Some("membership already approved")
    );
    assert_eq!(orchestrator.statistics().expect("stats load").activation_pending, 0);
    assert_eq!(activator.requests().len(), 1);
}
