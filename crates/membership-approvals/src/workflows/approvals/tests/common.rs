use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::workflows::approvals::access::{ReviewerContext, Role};
use crate::workflows::approvals::activation::{
    ActivationError, ActivationRequest, MembershipActivator,
};
use crate::workflows::approvals::audit::{AuditEmitter, AuditError, AuditEvent};
use crate::workflows::approvals::domain::{
    EntityType, NewTransaction, PaymentStatus, ReviewerId, Transaction, TransactionId,
};
use crate::workflows::approvals::policy::ApprovalSettings;
use crate::workflows::approvals::repository::{
    RepositoryError, TransactionQuery, TransactionRepository,
};
use crate::workflows::approvals::ApprovalOrchestrator;

pub(super) const FINANCIAL_REVIEWER: ReviewerId = ReviewerId(7);
pub(super) const SECOND_FINANCIAL_REVIEWER: ReviewerId = ReviewerId(8);
pub(super) const ADMIN: ReviewerId = ReviewerId(9);

pub(super) type TestOrchestrator = ApprovalOrchestrator<MemoryRepository, MemoryAudit, MemoryActivator>;

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn new_transaction(amount: i64, payment_status: PaymentStatus) -> NewTransaction {
    NewTransaction {
        entity_type: EntityType::Application,
        entity_reference: "application-1001".to_string(),
        amount: Decimal::new(amount, 0),
        payment_status,
    }
}

/// Insert a Pending/Pending transaction created `minutes` after the base time.
pub(super) fn seed(
    repository: &MemoryRepository,
    suffix: &str,
    amount: i64,
    minutes: i64,
) -> TransactionId {
    let id = TransactionId(format!("txn-{suffix}"));
    let record = Transaction::open(
        id.clone(),
        new_transaction(amount, PaymentStatus::Completed),
        base_time() + Duration::minutes(minutes),
    );
    repository.insert(record).expect("seed insert succeeds");
    id
}

pub(super) fn build_orchestrator(
    settings: ApprovalSettings,
) -> (
    TestOrchestrator,
    Arc<MemoryRepository>,
    Arc<MemoryAudit>,
    Arc<MemoryActivator>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let audit = Arc::new(MemoryAudit::default());
    let activator = Arc::new(MemoryActivator::default());
    let orchestrator = ApprovalOrchestrator::new(
        repository.clone(),
        audit.clone(),
        activator.clone(),
        settings,
    );
    (orchestrator, repository, audit, activator)
}

pub(super) fn financial_reviewer() -> ReviewerContext {
    ReviewerContext::new(FINANCIAL_REVIEWER, [Role::FinancialReviewer])
}

pub(super) fn admin() -> ReviewerContext {
    ReviewerContext::new(ADMIN, [Role::Admin])
}

pub(super) fn stored(repository: &MemoryRepository, id: &TransactionId) -> Transaction {
    repository
        .fetch(id)
        .expect("fetch succeeds")
        .expect("record present")
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<TransactionId, Transaction>>>,
    sequence: Arc<AtomicU64>,
}

impl TransactionRepository for MemoryRepository {
    fn next_id(&self) -> Result<TransactionId, RepositoryError> {
        let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(TransactionId(format!("txn-{next:06}")))
    }

    fn insert(&self, record: Transaction) -> Result<Transaction, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        mut record: Transaction,
        expected_version: u64,
    ) -> Result<Transaction, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let current = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        if current.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        record.version = expected_version + 1;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<Transaction> = guard
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(records)
    }
}

/// Repository whose first `update` loses the race to a concurrent writer.
#[derive(Default, Clone)]
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
}

impl TransactionRepository for RacingRepository {
    fn next_id(&self) -> Result<TransactionId, RepositoryError> {
        self.inner.next_id()
    }

    fn insert(&self, record: Transaction) -> Result<Transaction, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(
        &self,
        record: Transaction,
        expected_version: u64,
    ) -> Result<Transaction, RepositoryError> {
        {
            let mut guard = self.inner.records.lock().expect("repository mutex poisoned");
            if let Some(current) = guard.get_mut(&record.id) {
                current.version += 1;
                current.financial_admin_notes = Some("written by another reviewer".to_string());
            }
        }
        self.inner.update(record, expected_version)
    }

    fn fetch(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, RepositoryError> {
        self.inner.query(query)
    }
}

pub(super) struct UnavailableRepository;

impl TransactionRepository for UnavailableRepository {
    fn next_id(&self) -> Result<TransactionId, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _record: Transaction) -> Result<Transaction, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _record: Transaction,
        _expected_version: u64,
    ) -> Result<Transaction, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn query(&self, _query: &TransactionQuery) -> Result<Vec<Transaction>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Audit sink that can be switched into failing mode. Failed emits are not recorded.
#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryAudit {
    pub(super) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }

    pub(super) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditEmitter for MemoryAudit {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("audit sink offline".to_string()));
        }
        self.events.lock().expect("audit mutex poisoned").push(event);
        Ok(())
    }
}

/// Activation hook that can be switched into failing mode. Failed calls are not recorded.
#[derive(Default, Clone)]
pub(super) struct MemoryActivator {
    requests: Arc<Mutex<Vec<ActivationRequest>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryActivator {
    pub(super) fn requests(&self) -> Vec<ActivationRequest> {
        self.requests.lock().expect("activator mutex poisoned").clone()
    }

    pub(super) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MembershipActivator for MemoryActivator {
    fn activate(&self, request: ActivationRequest) -> Result<(), ActivationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ActivationError::Failed("membership service offline".to_string()));
        }
        self.requests
            .lock()
            .expect("activator mutex poisoned")
            .push(request);
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
