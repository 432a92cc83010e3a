use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Employee identifiers are assigned by HR (e.g. "E1", "1042"), not generated.
pub type EmployeeId = String;

/// An entry in the staff directory. Employees are never removed, only
/// deactivated, so that requests and balances stay attributable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub department: String,
    pub position: String,
    /// The immediate approver for this employee's requests
    pub direct_manager_id: Option<EmployeeId>,
    pub active: bool,
    pub hire_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        id: impl Into<EmployeeId>,
        name: impl Into<String>,
        department: impl Into<String>,
        position: impl Into<String>,
        hire_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department: department.into(),
            position: position.into(),
            direct_manager_id: None,
            active: true,
            hire_date,
            created_at: Utc::now(),
        }
    }

    pub fn with_manager(mut self, manager_id: impl Into<EmployeeId>) -> Self {
        self.direct_manager_id = Some(manager_id.into());
        self
    }

    /// True when `manager_id` is this employee's direct manager.
    pub fn reports_to(&self, manager_id: &str) -> bool {
        self.direct_manager_id.as_deref() == Some(manager_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hire_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 6).unwrap()
    }

    #[test]
    fn test_new_employee_is_active_without_manager() {
        let emp = Employee::new("E1", "Salma", "Operations", "Controller", hire_date());
        assert!(emp.active);
        assert!(emp.direct_manager_id.is_none());
    }

    #[test]
    fn test_reports_to() {
        let emp = Employee::new("E2", "Omar", "Security", "Officer", hire_date()).with_manager("M1");
        assert!(emp.reports_to("M1"));
        assert!(!emp.reports_to("M2"));
    }
}
