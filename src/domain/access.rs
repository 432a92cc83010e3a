use serde::{Deserialize, Serialize};

use super::{Account, AccountId, Employee, EmployeeId, Role};

/// The authenticated caller of a core operation.
///
/// Produced by authentication and passed explicitly into every operation;
/// there is no ambient "current user".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: AccountId,
    pub username: String,
    pub employee_id: EmployeeId,
    pub role: Role,
}

impl Actor {
    pub fn from_account(account: &Account) -> Self {
        Self {
            account_id: account.id,
            username: account.username.clone(),
            employee_id: account.employee_id.clone(),
            role: account.role,
        }
    }

    pub fn has_at_least(&self, role: Role) -> bool {
        self.role.has_at_least(role)
    }

    pub fn is_self(&self, employee_id: &str) -> bool {
        self.employee_id == employee_id
    }
}

/// Operations gated by a minimum role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReviewRequests,
    ProposeBalance,
    ReviewBalance,
    ManageDirectory,
    ManageAccounts,
    ViewAuditLog,
    ViewAllRequests,
}

impl Permission {
    pub fn required_role(&self) -> Role {
        match self {
            Permission::ReviewRequests => Role::DirectManager,
            Permission::ProposeBalance
            | Permission::ManageDirectory
            | Permission::ViewAllRequests => Role::AdminOfficer,
            Permission::ReviewBalance | Permission::ManageAccounts | Permission::ViewAuditLog => {
                Role::Admin
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Permission::ReviewRequests => "review leave requests",
            Permission::ProposeBalance => "propose leave balances",
            Permission::ReviewBalance => "review leave balances",
            Permission::ManageDirectory => "manage the employee directory",
            Permission::ManageAccounts => "manage user accounts",
            Permission::ViewAuditLog => "view the audit log",
            Permission::ViewAllRequests => "view all leave requests",
        }
    }
}

/// Role-ranked access rules.
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn allows(actor: &Actor, permission: Permission) -> bool {
        actor.has_at_least(permission.required_role())
    }

    /// Whether `actor` may see requests and balances belonging to `subject`.
    ///
    /// Employees see their own; direct managers see their direct reports;
    /// admin officers and admins see everyone.
    pub fn can_view(actor: &Actor, subject: &Employee) -> bool {
        match actor.role {
            Role::Employee => actor.is_self(&subject.id),
            Role::DirectManager => subject.reports_to(&actor.employee_id),
            Role::AdminOfficer | Role::Admin => true,
        }
    }

    /// Whether `actor` may approve or reject requests of `subject`.
    pub fn can_review(actor: &Actor, subject: &Employee) -> bool {
        match actor.role {
            Role::Employee => false,
            Role::DirectManager => subject.reports_to(&actor.employee_id),
            Role::AdminOfficer | Role::Admin => true,
        }
    }

    /// Whether `actor` may file a request on behalf of `subject`.
    pub fn can_submit_for(actor: &Actor, subject: &Employee) -> bool {
        actor.is_self(&subject.id) || actor.has_at_least(Role::AdminOfficer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;

    fn actor(employee_id: &str, role: Role) -> Actor {
        Actor {
            account_id: Uuid::new_v4(),
            username: employee_id.to_lowercase(),
            employee_id: employee_id.into(),
            role,
        }
    }

    fn employee(id: &str, manager: Option<&str>) -> Employee {
        let hire = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        let emp = Employee::new(id, id, "Operations", "Staff", hire);
        match manager {
            Some(m) => emp.with_manager(m),
            None => emp,
        }
    }

    #[test]
    fn test_employee_sees_only_self() {
        let me = actor("E1", Role::Employee);
        assert!(AccessPolicy::can_view(&me, &employee("E1", Some("M1"))));
        assert!(!AccessPolicy::can_view(&me, &employee("E2", Some("M1"))));
    }

    #[test]
    fn test_manager_sees_direct_reports_only() {
        let manager = actor("M1", Role::DirectManager);
        assert!(AccessPolicy::can_view(&manager, &employee("E1", Some("M1"))));
        assert!(!AccessPolicy::can_view(&manager, &employee("E2", Some("M2"))));
        assert!(!AccessPolicy::can_view(&manager, &employee("M1", None)));
    }

    #[test]
    fn test_officers_and_admins_see_everyone() {
        let subject = employee("E2", Some("M2"));
        assert!(AccessPolicy::can_view(&actor("O1", Role::AdminOfficer), &subject));
        assert!(AccessPolicy::can_view(&actor("A1", Role::Admin), &subject));
    }

    #[test]
    fn test_review_rules() {
        let subject = employee("E1", Some("M1"));
        assert!(!AccessPolicy::can_review(&actor("E1", Role::Employee), &subject));
        assert!(AccessPolicy::can_review(&actor("M1", Role::DirectManager), &subject));
        assert!(!AccessPolicy::can_review(&actor("M2", Role::DirectManager), &subject));
        assert!(AccessPolicy::can_review(&actor("O1", Role::AdminOfficer), &subject));
    }

    #[test]
    fn test_permission_gates() {
        let officer = actor("O1", Role::AdminOfficer);
        assert!(AccessPolicy::allows(&officer, Permission::ProposeBalance));
        assert!(AccessPolicy::allows(&officer, Permission::ReviewRequests));
        assert!(!AccessPolicy::allows(&officer, Permission::ReviewBalance));
        assert!(!AccessPolicy::allows(&officer, Permission::ManageAccounts));
        assert!(!AccessPolicy::allows(&officer, Permission::ViewAuditLog));

        let manager = actor("M1", Role::DirectManager);
        assert!(AccessPolicy::allows(&manager, Permission::ReviewRequests));
        assert!(!AccessPolicy::allows(&manager, Permission::ProposeBalance));

        let admin = actor("A1", Role::Admin);
        assert!(AccessPolicy::allows(&admin, Permission::ViewAuditLog));
    }

    #[test]
    fn test_submit_on_behalf() {
        let subject = employee("E1", Some("M1"));
        assert!(AccessPolicy::can_submit_for(&actor("E1", Role::Employee), &subject));
        assert!(!AccessPolicy::can_submit_for(&actor("M1", Role::DirectManager), &subject));
        assert!(AccessPolicy::can_submit_for(&actor("O1", Role::AdminOfficer), &subject));
    }
}
