use crate::infra::{InMemoryTransactionRepository, LoggingActivator, TracingAuditLog};
use clap::Args;
use membership_approvals::error::AppError;
use membership_approvals::workflows::approvals::{
    ApprovalError, ApprovalOrchestrator, ApprovalSettings, ApprovalStatistics, AuditEvent,
    AutoApprovalPolicy, EntityType, NewTransaction, PaymentStatus, ReadinessStatus,
    ReviewSubmission, ReviewerId, Transaction,
};
use rust_decimal::Decimal;
use std::sync::Arc;

const DEMO_SYSTEM_REVIEWER: ReviewerId = ReviewerId(1);
const DEMO_FINANCIAL_REVIEWER: ReviewerId = ReviewerId(7);
const DEMO_ADMIN: ReviewerId = ReviewerId(9);

#[derive(Args, Debug, Clone)]
pub(crate) struct DemoArgs {
    /// Payment amount for the demo transaction
    #[arg(long, default_value = "150")]
    pub(crate) amount: Decimal,
    /// Treat the payment as a membership renewal instead of a new application
    #[arg(long)]
    pub(crate) renewal: bool,
    /// Reject the payment at financial review
    #[arg(long)]
    pub(crate) reject_financial: bool,
    /// Reject the membership at final review
    #[arg(long)]
    pub(crate) reject_final: bool,
    /// Enable auto-approval for confirmed payments up to this amount
    #[arg(long)]
    pub(crate) auto_approve_limit: Option<Decimal>,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            amount: Decimal::new(150, 0),
            renewal: false,
            reject_financial: false,
            reject_final: false,
            auto_approve_limit: None,
        }
    }
}

struct DemoOutcome {
    transaction: Transaction,
    readiness: Vec<(&'static str, ReadinessStatus)>,
    audit: Vec<AuditEvent>,
    activations: usize,
    statistics: ApprovalStatistics,
}

fn settings_for(args: &DemoArgs) -> ApprovalSettings {
    let auto_approval = match args.auto_approve_limit {
        Some(max_amount) => AutoApprovalPolicy {
            enabled: true,
            max_amount,
            system_reviewer: DEMO_SYSTEM_REVIEWER,
            ..AutoApprovalPolicy::default()
        },
        None => AutoApprovalPolicy::default(),
    };
    ApprovalSettings {
        auto_approval,
        ..ApprovalSettings::default()
    }
}

fn walk_transaction(args: &DemoArgs) -> Result<DemoOutcome, ApprovalError> {
    let audit = Arc::new(TracingAuditLog::default());
    let activator = Arc::new(LoggingActivator::default());
    let orchestrator = ApprovalOrchestrator::new(
        Arc::new(InMemoryTransactionRepository::default()),
        audit.clone(),
        activator.clone(),
        settings_for(args),
    );

    let entity_type = if args.renewal {
        EntityType::Renewal
    } else {
        EntityType::Application
    };
    let mut readiness = Vec::new();

    let recorded = orchestrator.record_payment(NewTransaction {
        entity_type,
        entity_reference: format!("{}-demo-1", entity_type.label()),
        amount: args.amount,
        payment_status: PaymentStatus::Completed,
    })?;
    let id = recorded.id.clone();
    readiness.push(("recorded", orchestrator.readiness(&id)?));

    if recorded.financial_status.is_open() {
        orchestrator
            .financial()
            .start_review(&id, DEMO_FINANCIAL_REVIEWER)?;
        readiness.push(("claimed", orchestrator.readiness(&id)?));

        let submission = if args.reject_financial {
            ReviewSubmission::reject("payment could not be matched to a bank deposit")
        } else {
            ReviewSubmission::approve().with_notes("deposit matched")
        };
        orchestrator
            .financial()
            .complete_review(&id, DEMO_FINANCIAL_REVIEWER, submission)?;
        readiness.push(("financial decision", orchestrator.readiness(&id)?));
    }

    let transaction = orchestrator.get(&id)?;
    if transaction.current_stage().is_some() {
        let submission = if args.reject_final {
            ReviewSubmission::reject("membership criteria not met")
        } else {
            ReviewSubmission::approve()
        };
        orchestrator
            .final_review()
            .complete_review(&id, DEMO_ADMIN, submission)?;
        readiness.push(("final decision", orchestrator.readiness(&id)?));
    }

    Ok(DemoOutcome {
        transaction: orchestrator.get(&id)?,
        readiness,
        audit: audit.events(),
        activations: activator.activated().len(),
        statistics: orchestrator.statistics()?,
    })
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Two-tier membership approval demo");
    println!(
        "Payment of {} for a {}{}",
        args.amount,
        if args.renewal { "renewal" } else { "new application" },
        match args.auto_approve_limit {
            Some(limit) => format!(" (auto-approval up to {limit})"),
            None => String::new(),
        }
    );

    let outcome = walk_transaction(&args)?;

    println!("\nReadiness along the way");
    for (step, status) in &outcome.readiness {
        println!(
            "- {step}: financial {} / final {} | ready for financial {} | ready for final {}",
            status.financial_status,
            status.final_status,
            status.ready_for_financial,
            status.ready_for_final
        );
        if let Some(reason) = &status.blocking_reason {
            println!("  blocked: {reason}");
        }
    }

    println!("\nAudit trail");
    for event in &outcome.audit {
        let automatic = if event.automatic { " [automatic]" } else { "" };
        println!(
            "- {} {} by reviewer {}: {} -> {}{}",
            event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
            event.action.label(),
            event.reviewer_id,
            event.from_status,
            event.to_status,
            automatic
        );
        if let Some(reason) = &event.reason {
            println!("  reason: {reason}");
        }
    }

    let transaction = &outcome.transaction;
    println!(
        "\nTransaction {}: financial {} / final {} (version {})",
        transaction.id,
        transaction.financial_status.label(),
        transaction.final_status.label(),
        transaction.version
    );
    println!("Memberships activated: {}", outcome.activations);

    match serde_json::to_string_pretty(&outcome.statistics) {
        Ok(json) => println!("\nStatistics\n{json}"),
        Err(err) => println!("\nStatistics unavailable: {err}"),
    }

    Ok(())
}
