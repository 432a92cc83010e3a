use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{BalanceStatus, Days, LeavePool, LinkError, RequestError, RequestStatus, Role};

/// Broad failure categories, for callers that only need to know how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    NotFound,
    Integrity,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("End date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("A balance for employee {employee_id} in {year} already exists")]
    DuplicateBalance { employee_id: String, year: i32 },

    #[error("Invalid manager link: {0}")]
    InvalidManagerLink(#[from] LinkError),

    #[error("Employee {0} is not active")]
    EmployeeInactive(String),

    #[error(
        "Insufficient {pool} balance for employee {employee_id} in {year}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        employee_id: String,
        year: i32,
        pool: LeavePool,
        available: Days,
        requested: Days,
    },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Role {role} is not allowed to {action}")]
    Forbidden { role: Role, action: String },

    #[error("Leave request {id} is {status}, not pending")]
    RequestNotPending { id: String, status: RequestStatus },

    #[error("Balance {id} is {status}, not pending")]
    BalanceNotPending { id: String, status: BalanceStatus },

    #[error("Employee not found: {0}")]
    EmployeeNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Leave request not found: {0}")]
    RequestNotFound(String),

    #[error("Balance not found: {0}")]
    BalanceNotFound(String),

    #[error("No approved balance for employee {employee_id} in {year}")]
    NoApprovedBalance { employee_id: String, year: i32 },

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Employee already exists: {0}")]
    EmployeeAlreadyExists(String),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Employee {0} already has an account")]
    EmployeeHasAccount(String),

    #[error("Database already has accounts; sign in as an admin instead")]
    AlreadyInitialized,

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidDateRange { .. }
            | AppError::MissingField(_)
            | AppError::InvalidValue(_)
            | AppError::DuplicateBalance { .. }
            | AppError::InvalidManagerLink(_)
            | AppError::EmployeeInactive(_)
            | AppError::InsufficientBalance { .. } => ErrorKind::Validation,

            AppError::InvalidCredentials | AppError::Forbidden { .. } => ErrorKind::Authorization,

            AppError::RequestNotPending { .. } | AppError::BalanceNotPending { .. } => {
                ErrorKind::StateConflict
            }

            AppError::EmployeeNotFound(_)
            | AppError::AccountNotFound(_)
            | AppError::RequestNotFound(_)
            | AppError::BalanceNotFound(_)
            | AppError::NoApprovedBalance { .. }
            | AppError::NotificationNotFound(_) => ErrorKind::NotFound,

            AppError::EmployeeAlreadyExists(_)
            | AppError::UsernameTaken(_)
            | AppError::EmployeeHasAccount(_)
            | AppError::AlreadyInitialized => ErrorKind::Integrity,

            AppError::PasswordHash(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn forbidden(role: Role, action: impl Into<String>) -> Self {
        AppError::Forbidden {
            role,
            action: action.into(),
        }
    }

    pub(crate) fn from_request_error(id: impl ToString, err: RequestError) -> Self {
        match err {
            RequestError::EndBeforeStart { start, end } => AppError::InvalidDateRange { start, end },
            RequestError::NotPending(status) => AppError::RequestNotPending {
                id: id.to_string(),
                status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            AppError::InvalidDateRange { start, end }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::forbidden(Role::Employee, "approve").kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            AppError::RequestNotPending {
                id: "r".into(),
                status: RequestStatus::Rejected
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(AppError::UsernameTaken("x".into()).kind(), ErrorKind::Integrity);
        assert_eq!(AppError::RequestNotFound("x".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_messages_are_readable() {
        let err = AppError::RequestNotPending {
            id: "42".into(),
            status: RequestStatus::Approved,
        };
        assert_eq!(err.to_string(), "Leave request 42 is approved, not pending");

        let err = AppError::forbidden(Role::DirectManager, "approve balances");
        assert_eq!(
            err.to_string(),
            "Role direct_manager is not allowed to approve balances"
        );
    }
}
