use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

pub type AuditId = Uuid;

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EmployeeAdded,
    ManagerChanged,
    EmployeeDeactivated,
    AccountCreated,
    RoleChanged,
    AccountDeactivated,
    RequestSubmitted,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
    BalanceProposed,
    BalanceApproved,
    BalanceRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EmployeeAdded => "employee_added",
            AuditAction::ManagerChanged => "manager_changed",
            AuditAction::EmployeeDeactivated => "employee_deactivated",
            AuditAction::AccountCreated => "account_created",
            AuditAction::RoleChanged => "role_changed",
            AuditAction::AccountDeactivated => "account_deactivated",
            AuditAction::RequestSubmitted => "request_submitted",
            AuditAction::RequestApproved => "request_approved",
            AuditAction::RequestRejected => "request_rejected",
            AuditAction::RequestCancelled => "request_cancelled",
            AuditAction::BalanceProposed => "balance_proposed",
            AuditAction::BalanceApproved => "balance_approved",
            AuditAction::BalanceRejected => "balance_rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let action = match s {
            "employee_added" => AuditAction::EmployeeAdded,
            "manager_changed" => AuditAction::ManagerChanged,
            "employee_deactivated" => AuditAction::EmployeeDeactivated,
            "account_created" => AuditAction::AccountCreated,
            "role_changed" => AuditAction::RoleChanged,
            "account_deactivated" => AuditAction::AccountDeactivated,
            "request_submitted" => AuditAction::RequestSubmitted,
            "request_approved" => AuditAction::RequestApproved,
            "request_rejected" => AuditAction::RequestRejected,
            "request_cancelled" => AuditAction::RequestCancelled,
            "balance_proposed" => AuditAction::BalanceProposed,
            "balance_approved" => AuditAction::BalanceApproved,
            "balance_rejected" => AuditAction::BalanceRejected,
            _ => return None,
        };
        Some(action)
    }

    /// Kind of record the action touches, stored alongside the entity id.
    pub fn entity(&self) -> &'static str {
        match self {
            AuditAction::EmployeeAdded
            | AuditAction::ManagerChanged
            | AuditAction::EmployeeDeactivated => "employee",
            AuditAction::AccountCreated
            | AuditAction::RoleChanged
            | AuditAction::AccountDeactivated => "account",
            AuditAction::RequestSubmitted
            | AuditAction::RequestApproved
            | AuditAction::RequestRejected
            | AuditAction::RequestCancelled => "vacation_request",
            AuditAction::BalanceProposed
            | AuditAction::BalanceApproved
            | AuditAction::BalanceRejected => "vacation_balance",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    /// `None` for bootstrap actions taken before any account exists
    pub actor: Option<AccountId>,
    pub action: AuditAction,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: Option<AccountId>,
        action: AuditAction,
        entity_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            action,
            entity_id: entity_id.into(),
            details,
            created_at: Utc::now(),
        }
    }

    pub fn entity(&self) -> &'static str {
        self.action.entity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip() {
        for action in [
            AuditAction::EmployeeAdded,
            AuditAction::ManagerChanged,
            AuditAction::EmployeeDeactivated,
            AuditAction::AccountCreated,
            AuditAction::RoleChanged,
            AuditAction::AccountDeactivated,
            AuditAction::RequestSubmitted,
            AuditAction::RequestApproved,
            AuditAction::RequestRejected,
            AuditAction::RequestCancelled,
            AuditAction::BalanceProposed,
            AuditAction::BalanceApproved,
            AuditAction::BalanceRejected,
        ] {
            assert_eq!(AuditAction::from_str(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_entity_kind() {
        assert_eq!(AuditAction::RequestApproved.entity(), "vacation_request");
        assert_eq!(AuditAction::BalanceProposed.entity(), "vacation_balance");
        assert_eq!(AuditAction::RoleChanged.entity(), "account");
    }
}
