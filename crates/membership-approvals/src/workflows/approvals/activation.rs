use serde::{Deserialize, Serialize};

use super::domain::{EntityType, ReviewerId, TransactionId};

/// Request handed to the membership system once final approval lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub transaction_id: TransactionId,
    pub entity_type: EntityType,
    pub entity_reference: String,
    pub approved_by: ReviewerId,
}

/// Downstream hook that grants or renews membership.
pub trait MembershipActivator: Send + Sync {
    fn activate(&self, request: ActivationRequest) -> Result<(), ActivationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("membership activation failed: {0}")]
    Failed(String),
}
