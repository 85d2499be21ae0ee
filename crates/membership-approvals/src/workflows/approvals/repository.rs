use serde::{Deserialize, Serialize};

use super::domain::{FinalStatus, FinancialStatus, Transaction, TransactionId};
use super::error::ApprovalError;

/// Explicit filter for transaction listings. Empty status lists match every status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub financial_statuses: Vec<FinancialStatus>,
    pub final_statuses: Vec<FinalStatus>,
}

impl TransactionQuery {
    pub fn financial(statuses: &[FinancialStatus]) -> Self {
        Self {
            financial_statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_final(mut self, statuses: &[FinalStatus]) -> Self {
        self.final_statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, record: &Transaction) -> bool {
        let financial = self.financial_statuses.is_empty()
            || self.financial_statuses.contains(&record.financial_status);
        let final_stage =
            self.final_statuses.is_empty() || self.final_statuses.contains(&record.final_status);
        financial && final_stage
    }
}

/// Storage abstraction so the engines can be exercised in isolation.
///
/// `update` is a compare-and-swap on [`Transaction::version`]: the write only lands when
/// the stored version still equals `expected_version`, and the stored copy comes back
/// with the bumped version.
///
/// Identifiers come from the store (`next_id`) so they stay unique across restarts.
pub trait TransactionRepository: Send + Sync {
    fn next_id(&self) -> Result<TransactionId, RepositoryError>;
    fn insert(&self, record: Transaction) -> Result<Transaction, RepositoryError>;
    fn update(
        &self,
        record: Transaction,
        expected_version: u64,
    ) -> Result<Transaction, RepositoryError>;
    fn fetch(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError>;
    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub(crate) fn load_transaction<R>(
    repository: &R,
    id: &TransactionId,
) -> Result<Transaction, ApprovalError>
where
    R: TransactionRepository + ?Sized,
{
    repository
        .fetch(id)
        .map_err(|error| ApprovalError::from_repository(id, error))?
        .ok_or_else(|| ApprovalError::NotFound(id.clone()))
}

/// Write through the compare-and-swap using the version the caller read.
pub(crate) fn persist_transaction<R>(
    repository: &R,
    record: Transaction,
) -> Result<Transaction, ApprovalError>
where
    R: TransactionRepository + ?Sized,
{
    let id = record.id.clone();
    let expected_version = record.version;
    repository
        .update(record, expected_version)
        .map_err(|error| ApprovalError::from_repository(&id, error))
}
