use axum::http::StatusCode;

use super::activation::ActivationError;
use super::audit::AuditError;
use super::domain::TransactionId;
use super::repository::RepositoryError;

/// Error raised by the review engines and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(String),
    #[error("transaction {0} not found")]
    NotFound(TransactionId),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Authorization(String),
    #[error("transaction {0} was modified concurrently, reload and retry")]
    ConcurrentModification(TransactionId),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

impl ApprovalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApprovalError::Validation(_) => StatusCode::BAD_REQUEST,
            ApprovalError::Authorization(_) => StatusCode::FORBIDDEN,
            ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
            ApprovalError::InvalidState(_) | ApprovalError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            ApprovalError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            ApprovalError::Repository(_) | ApprovalError::Audit(_) | ApprovalError::Activation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable kind for clients and bulk reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            ApprovalError::Validation(_) => "validation",
            ApprovalError::NotFound(_) => "not_found",
            ApprovalError::InvalidState(_) => "invalid_state",
            ApprovalError::Precondition(_) => "precondition",
            ApprovalError::Authorization(_) => "authorization",
            ApprovalError::ConcurrentModification(_) => "concurrent_modification",
            ApprovalError::Repository(_) => "repository",
            ApprovalError::Audit(_) => "audit",
            ApprovalError::Activation(_) => "activation",
        }
    }

    /// Translate store errors for a specific transaction, keeping the typed variants.
    pub(crate) fn from_repository(id: &TransactionId, error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => ApprovalError::NotFound(id.clone()),
            RepositoryError::VersionConflict { .. } => {
                ApprovalError::ConcurrentModification(id.clone())
            }
            other => ApprovalError::Repository(other),
        }
    }
}

impl From<RepositoryError> for ApprovalError {
    fn from(value: RepositoryError) -> Self {
        ApprovalError::Repository(value)
    }
}
