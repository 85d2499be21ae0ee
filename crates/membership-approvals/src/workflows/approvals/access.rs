use serde::{Deserialize, Serialize};

use super::domain::{ReviewStage, ReviewerId};
use super::error::ApprovalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FinancialReviewer,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "financial_reviewer" => Some(Role::FinancialReviewer),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::FinancialReviewer => "financial_reviewer",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

pub const FINANCIAL_ROLES: &[Role] = &[Role::FinancialReviewer];
pub const FINAL_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];
pub const ANY_REVIEWER_ROLES: &[Role] = &[Role::FinancialReviewer, Role::Admin, Role::SuperAdmin];

/// Authenticated caller identity as resolved by the upstream authorization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerContext {
    pub reviewer_id: ReviewerId,
    pub roles: Vec<Role>,
}

impl ReviewerContext {
    pub fn new(reviewer_id: ReviewerId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            reviewer_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_any(&self, allowed: &[Role]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }

    pub fn require_any(&self, allowed: &[Role]) -> Result<(), ApprovalError> {
        if self.has_any(allowed) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|role| role.label())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(ApprovalError::Authorization(format!(
            "reviewer {} requires role {expected}",
            self.reviewer_id
        )))
    }

    pub fn require_stage(&self, stage: ReviewStage) -> Result<(), ApprovalError> {
        match stage {
            ReviewStage::Financial => self.require_any(FINANCIAL_ROLES),
            ReviewStage::Final => self.require_any(FINAL_ROLES),
        }
    }
}
