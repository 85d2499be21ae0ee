use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::access::{
    ReviewerContext, Role, ANY_REVIEWER_ROLES, FINAL_ROLES, FINANCIAL_ROLES,
};
use super::activation::MembershipActivator;
use super::audit::AuditEmitter;
use super::domain::{
    NewTransaction, PaymentStatus, ReviewDecision, ReviewSubmission, ReviewerId, TransactionId,
};
use super::error::ApprovalError;
use super::orchestrator::ApprovalOrchestrator;
use super::repository::TransactionRepository;

pub const REVIEWER_ID_HEADER: &str = "x-reviewer-id";
pub const REVIEWER_ROLES_HEADER: &str = "x-reviewer-roles";

type SharedOrchestrator<R, A, M> = Arc<ApprovalOrchestrator<R, A, M>>;

/// Router builder exposing the financial and final review endpoints.
pub fn approval_router<R, A, M>(orchestrator: SharedOrchestrator<R, A, M>) -> Router
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    Router::new()
        .route(
            "/financial-review/applications",
            get(list_financial_handler::<R, A, M>),
        )
        .route(
            "/financial-review/stats",
            get(statistics_handler::<R, A, M>),
        )
        .route(
            "/financial-review/:id/start",
            post(start_financial_handler::<R, A, M>),
        )
        .route(
            "/financial-review/:id/reassign",
            post(reassign_financial_handler::<R, A, M>),
        )
        .route(
            "/financial-review/:id/complete",
            post(complete_financial_handler::<R, A, M>),
        )
        .route(
            "/final-review/applications",
            get(list_final_handler::<R, A, M>),
        )
        .route(
            "/final-review/:id/complete",
            post(complete_final_handler::<R, A, M>),
        )
        .route(
            "/final-review/:id/activate",
            post(retry_activation_handler::<R, A, M>),
        )
        .route(
            "/approvals/bulk-approve",
            post(bulk_approve_handler::<R, A, M>),
        )
        .route(
            "/approvals/auto-approve",
            post(auto_approve_handler::<R, A, M>),
        )
        .route("/transactions", post(create_transaction_handler::<R, A, M>))
        .route("/transactions/:id", get(transaction_handler::<R, A, M>))
        .route(
            "/transactions/:id/readiness",
            get(readiness_handler::<R, A, M>),
        )
        .route(
            "/transactions/:id/auto-approve",
            post(auto_approve_transaction_handler::<R, A, M>),
        )
        .route(
            "/transactions/:id/payment-status",
            put(payment_status_handler::<R, A, M>),
        )
        .with_state(orchestrator)
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn respond<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    let body = Envelope {
        success: status.is_success(),
        data: Some(data),
        message: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApprovalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "approval request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "approval request rejected");
        }
        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            message: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ReviewerContext
where
    S: Send + Sync,
{
    type Rejection = ApprovalError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        reviewer_from_headers(&parts.headers)
    }
}

/// Resolve the caller identity forwarded by the authenticating gateway.
pub fn reviewer_from_headers(headers: &HeaderMap) -> Result<ReviewerContext, ApprovalError> {
    let reviewer_id = headers
        .get(REVIEWER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(ReviewerId)
        .ok_or_else(|| {
            ApprovalError::Authorization(format!(
                "missing or invalid {REVIEWER_ID_HEADER} header"
            ))
        })?;

    let roles = headers
        .get(REVIEWER_ROLES_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw.split(',').filter_map(Role::parse).collect::<Vec<_>>())
        .unwrap_or_default();

    Ok(ReviewerContext::new(reviewer_id, roles))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApprovalError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApprovalError::Validation(rejection.body_text()))
}

fn parse_decision(raw: &str, field: &str) -> Result<ReviewDecision, ApprovalError> {
    ReviewDecision::parse(raw).ok_or_else(|| {
        ApprovalError::Validation(format!(
            "{field} must be one of approved, rejected (got '{raw}')"
        ))
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinancialDecisionBody {
    pub financial_status: String,
    #[serde(default)]
    pub financial_rejection_reason: Option<String>,
    #[serde(default)]
    pub financial_admin_notes: Option<String>,
}

impl FinancialDecisionBody {
    fn into_submission(self) -> Result<ReviewSubmission, ApprovalError> {
        Ok(ReviewSubmission {
            decision: parse_decision(&self.financial_status, "financial_status")?,
            rejection_reason: self.financial_rejection_reason,
            notes: self.financial_admin_notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalDecisionBody {
    pub status: String,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

impl FinalDecisionBody {
    fn into_submission(self) -> Result<ReviewSubmission, ApprovalError> {
        Ok(ReviewSubmission {
            decision: parse_decision(&self.status, "status")?,
            rejection_reason: self.rejection_reason,
            notes: self.admin_notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkApproveBody {
    pub transaction_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentStatusBody {
    pub payment_status: PaymentStatus,
}

pub(crate) async fn list_financial_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINANCIAL_ROLES)?;
    let records = orchestrator
        .financial()
        .list_for_review(reviewer.reviewer_id)?;
    let message = format!("{} transaction(s) awaiting financial review", records.len());
    Ok(respond(StatusCode::OK, records, message))
}

pub(crate) async fn start_financial_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINANCIAL_ROLES)?;
    let record = orchestrator
        .financial()
        .start_review(&TransactionId(id), reviewer.reviewer_id)?;
    Ok(respond(StatusCode::OK, record, "financial review started"))
}

pub(crate) async fn reassign_financial_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINANCIAL_ROLES)?;
    let record = orchestrator
        .financial()
        .reassign_review(&TransactionId(id), reviewer.reviewer_id)?;
    Ok(respond(StatusCode::OK, record, "financial review reassigned"))
}

pub(crate) async fn complete_financial_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
    payload: Result<Json<FinancialDecisionBody>, JsonRejection>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINANCIAL_ROLES)?;
    let submission = json_body(payload)?.into_submission()?;
    let decision = submission.decision;
    let record = orchestrator.financial().complete_review(
        &TransactionId(id),
        reviewer.reviewer_id,
        submission,
    )?;
    let message = format!("financial review {}", decision.label());
    Ok(respond(StatusCode::OK, record, message))
}

pub(crate) async fn list_final_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let records = orchestrator.final_review().list_for_review()?;
    let message = format!("{} transaction(s) ready for final review", records.len());
    Ok(respond(StatusCode::OK, records, message))
}

pub(crate) async fn complete_final_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
    payload: Result<Json<FinalDecisionBody>, JsonRejection>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let submission = json_body(payload)?.into_submission()?;
    let decision = submission.decision;
    let record = orchestrator.final_review().complete_review(
        &TransactionId(id),
        reviewer.reviewer_id,
        submission,
    )?;
    let message = format!("final review {}", decision.label());
    Ok(respond(StatusCode::OK, record, message))
}

pub(crate) async fn retry_activation_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let record = orchestrator.retry_activation(&TransactionId(id))?;
    Ok(respond(StatusCode::OK, record, "membership activated"))
}

pub(crate) async fn bulk_approve_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    payload: Result<Json<BulkApproveBody>, JsonRejection>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(ANY_REVIEWER_ROLES)?;
    let body = json_body(payload)?;
    if body.transaction_ids.is_empty() {
        return Err(ApprovalError::Validation(
            "transaction_ids must not be empty".to_string(),
        ));
    }
    let ids: Vec<TransactionId> = body.transaction_ids.into_iter().map(TransactionId).collect();
    let report = orchestrator.bulk_approve(&ids, &reviewer, body.notes);

    let message = format!(
        "{} approved, {} failed",
        report.successful, report.failed
    );
    let body = Envelope {
        success: report.failed == 0,
        data: Some(report),
        message: Some(message),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub(crate) async fn auto_approve_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let report = orchestrator.run_auto_approval()?;
    let message = format!("{} transaction(s) auto-approved", report.successful);
    Ok(respond(StatusCode::OK, report, message))
}

pub(crate) async fn auto_approve_transaction_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let record = orchestrator.auto_approve(&TransactionId(id))?;
    Ok(respond(StatusCode::OK, record, "transaction auto-approved"))
}

pub(crate) async fn statistics_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(ANY_REVIEWER_ROLES)?;
    let stats = orchestrator.statistics()?;
    Ok(respond(StatusCode::OK, stats, "approval statistics"))
}

pub(crate) async fn create_transaction_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    payload: Result<Json<NewTransaction>, JsonRejection>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(FINAL_ROLES)?;
    let record = orchestrator.record_payment(json_body(payload)?)?;
    Ok(respond(StatusCode::CREATED, record, "payment recorded"))
}

pub(crate) async fn transaction_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(ANY_REVIEWER_ROLES)?;
    let record = orchestrator.get(&TransactionId(id))?;
    Ok(respond(StatusCode::OK, record, "transaction loaded"))
}

pub(crate) async fn readiness_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(ANY_REVIEWER_ROLES)?;
    let readiness = orchestrator.readiness(&TransactionId(id))?;
    Ok(respond(StatusCode::OK, readiness, "readiness evaluated"))
}

pub(crate) async fn payment_status_handler<R, A, M>(
    State(orchestrator): State<SharedOrchestrator<R, A, M>>,
    reviewer: ReviewerContext,
    Path(id): Path<String>,
    payload: Result<Json<PaymentStatusBody>, JsonRejection>,
) -> Result<Response, ApprovalError>
where
    R: TransactionRepository + 'static,
    A: AuditEmitter + 'static,
    M: MembershipActivator + 'static,
{
    reviewer.require_any(ANY_REVIEWER_ROLES)?;
    let body = json_body(payload)?;
    let record = orchestrator.update_payment_status(
        &TransactionId(id),
        body.payment_status,
        reviewer.reviewer_id,
    )?;
    Ok(respond(StatusCode::OK, record, "payment status updated"))
}
