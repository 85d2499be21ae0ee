use metrics_exporter_prometheus::PrometheusHandle;
use membership_approvals::workflows::approvals::{
    ActivationError, ActivationRequest, AuditEmitter, AuditError, AuditEvent,
    MembershipActivator, RepositoryError, Transaction, TransactionId, TransactionQuery,
    TransactionRepository,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("transaction store lock poisoned".to_string()))
}

/// Process-local transaction store with compare-and-swap updates on `version`.
#[derive(Default, Clone)]
pub(crate) struct InMemoryTransactionRepository {
    records: Arc<Mutex<HashMap<TransactionId, Transaction>>>,
    sequence: Arc<AtomicU64>,
}

impl TransactionRepository for InMemoryTransactionRepository {
    fn next_id(&self) -> Result<TransactionId, RepositoryError> {
        let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(TransactionId(format!("txn-{next:06}")))
    }

    fn insert(&self, record: Transaction) -> Result<Transaction, RepositoryError> {
        let mut guard = lock(&self.records)?;
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
        let mut guard = lock(&self.records)?;
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
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut records: Vec<Transaction> = guard
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(records)
    }
}

/// Audit sink that logs every event and keeps the trail for inspection.
#[derive(Default, Clone)]
pub(crate) struct TracingAuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl AuditEmitter for TracingAuditLog {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "membership_approvals::audit",
            transaction_id = %event.transaction_id,
            stage = event.stage.label(),
            action = event.action.label(),
            reviewer_id = %event.reviewer_id,
            from = %event.from_status,
            to = %event.to_status,
            automatic = event.automatic,
            "audit event"
        );
        let mut guard = self
            .events
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;
        guard.push(event);
        Ok(())
    }
}

impl TracingAuditLog {
    pub(crate) fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Stand-in for the membership service: records activations instead of calling out.
#[derive(Default, Clone)]
pub(crate) struct LoggingActivator {
    activated: Arc<Mutex<Vec<ActivationRequest>>>,
}

impl MembershipActivator for LoggingActivator {
    fn activate(&self, request: ActivationRequest) -> Result<(), ActivationError> {
        info!(
            transaction_id = %request.transaction_id,
            entity = request.entity_type.label(),
            reference = %request.entity_reference,
            approved_by = %request.approved_by,
            "membership activated"
        );
        let mut guard = self
            .activated
            .lock()
            .map_err(|_| ActivationError::Failed("activation log lock poisoned".to_string()))?;
        guard.push(request);
        Ok(())
    }
}

impl LoggingActivator {
    pub(crate) fn activated(&self) -> Vec<ActivationRequest> {
        self.activated
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
