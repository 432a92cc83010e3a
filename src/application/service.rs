use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::config::BalancePolicy;
use crate::domain::{
    AccessPolicy, Account, Actor, AuditAction, AuditEntry, BalanceCheck, BalanceId,
    BalanceStatus, Days, Employee, LeavePool, LinkError, ManagerGraph, Notification,
    NotificationId, Permission, Pools, RequestId, Role, VacationBalance, VacationRequest,
    hash_password, verify_password,
};
use crate::storage::Repository;

use super::AppError;

/// Application service implementing the leave workflow, the balance ledger
/// and the directory on top of the repository.
///
/// Every operation except [`LeaveService::authenticate`] and
/// [`LeaveService::bootstrap`] takes the calling [`Actor`] explicitly.
pub struct LeaveService {
    repo: Repository,
    balance_policy: BalancePolicy,
}

/// Fields for a new directory entry
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub id: String,
    pub name: String,
    pub department: String,
    pub position: String,
    pub direct_manager_id: Option<String>,
    pub hire_date: NaiveDate,
}

impl NewEmployee {
    /// Trim every field; a blank manager id means no manager.
    fn normalized(self) -> Self {
        Self {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            department: self.department.trim().to_string(),
            position: self.position.trim().to_string(),
            direct_manager_id: self
                .direct_manager_id
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            hire_date: self.hire_date,
        }
    }
}

/// A leave request as filed by (or for) an employee
#[derive(Debug, Clone)]
pub struct LeaveApplication {
    pub employee_id: String,
    pub category: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Result of submitting a leave request
#[derive(Debug)]
pub struct SubmissionResult {
    pub request: VacationRequest,
    /// Balance position at submission time, for display
    pub balance_check: BalanceCheck,
    /// Whether the direct manager was notified
    pub manager_notified: bool,
}

impl LeaveService {
    /// Create a new service with the given repository and the default balance policy.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            balance_policy: BalancePolicy::default(),
        }
    }

    pub fn with_balance_policy(mut self, policy: BalancePolicy) -> Self {
        self.balance_policy = policy;
        self
    }

    pub fn balance_policy(&self) -> BalancePolicy {
        self.balance_policy
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Authentication
    // ========================

    /// Create the first employee and an admin account for them.
    /// Only allowed while the database has no accounts at all.
    pub async fn bootstrap(
        &self,
        employee: NewEmployee,
        username: &str,
        password: &str,
    ) -> Result<Actor, AppError> {
        let employee = employee.normalized();
        validate_new_employee(&employee)?;
        validate_credentials(username, password)?;

        let password_hash = hash(password)?;
        let account = Account::new(username.trim(), password_hash, employee.id.clone(), Role::Admin);

        let mut tx = self.repo.begin().await?;
        if Repository::count_accounts(&mut *tx).await? > 0 {
            return Err(AppError::AlreadyInitialized);
        }
        if Repository::find_employee(&mut *tx, &employee.id).await?.is_none() {
            let record = build_employee(employee);
            Repository::insert_employee(&mut *tx, &record).await?;
            Repository::insert_audit(
                &mut *tx,
                &AuditEntry::new(None, AuditAction::EmployeeAdded, &record.id, json!({ "name": record.name })),
            )
            .await?;
        }
        Repository::insert_account(&mut *tx, &account).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                None,
                AuditAction::AccountCreated,
                account.id.to_string(),
                json!({ "username": account.username, "role": account.role }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit bootstrap")?;

        info!(username = %account.username, employee_id = %account.employee_id, "Bootstrapped admin account");
        Ok(Actor::from_account(&account))
    }

    /// Check a username and password and return the caller context.
    ///
    /// Unknown users, wrong passwords and deactivated accounts or employees
    /// all fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Actor, AppError> {
        let Some(account) = self.repo.get_account_by_username(username.trim()).await? else {
            warn!(username, "Login failed: unknown username");
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, &account.password_hash) {
            warn!(username, "Login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }
        if !account.active {
            warn!(username, "Login failed: account deactivated");
            return Err(AppError::InvalidCredentials);
        }
        let employee_active = self
            .repo
            .get_employee(&account.employee_id)
            .await?
            .is_some_and(|e| e.active);
        if !employee_active {
            warn!(username, employee_id = %account.employee_id, "Login failed: employee inactive");
            return Err(AppError::InvalidCredentials);
        }

        debug!(username, role = %account.role, "Authenticated");
        Ok(Actor::from_account(&account))
    }

    // ========================
    // Directory
    // ========================

    /// Add an employee to the directory.
    pub async fn add_employee(&self, actor: &Actor, employee: NewEmployee) -> Result<Employee, AppError> {
        self.require(actor, Permission::ManageDirectory)?;
        let employee = employee.normalized();
        validate_new_employee(&employee)?;

        let mut tx = self.repo.begin().await?;
        let employees = Repository::load_employees(&mut *tx, true).await?;
        if employees.iter().any(|e| e.id == employee.id) {
            return Err(AppError::EmployeeAlreadyExists(employee.id));
        }
        if let Some(manager_id) = &employee.direct_manager_id {
            let mut graph = ManagerGraph::from_employees(&employees);
            graph
                .insert(&employee.id, Some(manager_id.as_str()))
                .map_err(link_error)?;
            ensure_active_manager(&employees, manager_id)?;
        }

        let record = build_employee(employee);
        Repository::insert_employee(&mut *tx, &record).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::EmployeeAdded,
                &record.id,
                json!({
                    "name": record.name,
                    "department": record.department,
                    "direct_manager_id": record.direct_manager_id,
                }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit new employee")?;

        info!(employee_id = %record.id, by = %actor.username, "Employee added");
        Ok(record)
    }

    /// Get an employee the actor is allowed to see.
    pub async fn get_employee(&self, actor: &Actor, id: &str) -> Result<Employee, AppError> {
        let employee = self.load_employee(id).await?;
        if !(AccessPolicy::allows(actor, Permission::ManageDirectory) || self.can_view(actor, &employee)) {
            return Err(AppError::forbidden(actor.role, format!("view employee {}", id)));
        }
        Ok(employee)
    }

    pub async fn list_employees(&self, actor: &Actor, include_inactive: bool) -> Result<Vec<Employee>, AppError> {
        self.require(actor, Permission::ManageDirectory)?;
        Ok(self.repo.list_employees(include_inactive).await?)
    }

    /// Point an employee at a new direct manager, or clear the link.
    pub async fn set_manager(
        &self,
        actor: &Actor,
        employee_id: &str,
        manager_id: Option<&str>,
    ) -> Result<Employee, AppError> {
        self.require(actor, Permission::ManageDirectory)?;
        let manager_id = manager_id.map(str::trim).filter(|m| !m.is_empty());

        // The link is checked against the directory read inside the transaction.
        let mut tx = self.repo.begin().await?;
        let employees = Repository::load_employees(&mut *tx, true).await?;
        let mut employee = employees
            .iter()
            .find(|e| e.id == employee_id)
            .cloned()
            .ok_or_else(|| AppError::EmployeeNotFound(employee_id.to_string()))?;

        let graph = ManagerGraph::from_employees(&employees);
        graph.validate_link(employee_id, manager_id).map_err(link_error)?;
        if let Some(manager_id) = manager_id {
            ensure_active_manager(&employees, manager_id)?;
        }

        let previous = employee.direct_manager_id.clone();
        Repository::set_manager(&mut *tx, employee_id, manager_id).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::ManagerChanged,
                employee_id,
                json!({ "from": previous, "to": manager_id }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit manager change")?;

        employee.direct_manager_id = manager_id.map(str::to_string);
        info!(employee_id, manager_id = ?manager_id, by = %actor.username, "Manager changed");
        Ok(employee)
    }

    /// Deactivate an employee and their account. Records are kept.
    pub async fn deactivate_employee(&self, actor: &Actor, employee_id: &str) -> Result<Employee, AppError> {
        self.require(actor, Permission::ManageDirectory)?;
        let mut employee = self.load_employee(employee_id).await?;
        if !employee.active {
            return Err(AppError::EmployeeInactive(employee.id));
        }

        let mut tx = self.repo.begin().await?;
        Repository::deactivate_employee(&mut *tx, employee_id).await?;
        let accounts = Repository::deactivate_accounts_for_employee(&mut *tx, employee_id).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::EmployeeDeactivated,
                employee_id,
                json!({ "accounts_deactivated": accounts }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit deactivation")?;

        employee.active = false;
        info!(employee_id, by = %actor.username, "Employee deactivated");
        Ok(employee)
    }

    // ========================
    // Accounts
    // ========================

    pub async fn create_account(
        &self,
        actor: &Actor,
        username: &str,
        password: &str,
        employee_id: &str,
        role: Role,
    ) -> Result<Account, AppError> {
        self.require(actor, Permission::ManageAccounts)?;
        validate_credentials(username, password)?;
        let username = username.trim();

        let password_hash = hash(password)?;

        let mut tx = self.repo.begin().await?;
        let employee = load_employee_in(&mut *tx, employee_id).await?;
        if !employee.active {
            return Err(AppError::EmployeeInactive(employee.id));
        }
        if Repository::find_account_by_username(&mut *tx, username).await?.is_some() {
            return Err(AppError::UsernameTaken(username.to_string()));
        }
        if Repository::find_account_for_employee(&mut *tx, employee_id).await?.is_some() {
            return Err(AppError::EmployeeHasAccount(employee_id.to_string()));
        }

        let account = Account::new(username, password_hash, employee_id, role);
        Repository::insert_account(&mut *tx, &account).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::AccountCreated,
                account.id.to_string(),
                json!({ "username": account.username, "employee_id": employee_id, "role": role }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit account")?;

        info!(username, employee_id, role = %role, by = %actor.username, "Account created");
        Ok(account)
    }

    pub async fn list_accounts(&self, actor: &Actor) -> Result<Vec<Account>, AppError> {
        self.require(actor, Permission::ManageAccounts)?;
        Ok(self.repo.list_accounts().await?)
    }

    pub async fn set_role(&self, actor: &Actor, username: &str, role: Role) -> Result<Account, AppError> {
        self.require(actor, Permission::ManageAccounts)?;
        let mut account = self.load_account_by_username(username).await?;
        if account.id == actor.account_id {
            return Err(AppError::forbidden(actor.role, "change their own role"));
        }

        let previous = account.role;
        let mut tx = self.repo.begin().await?;
        Repository::set_role(&mut *tx, account.id, role).await?;
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::RoleChanged,
                account.id.to_string(),
                json!({ "from": previous, "to": role }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit role change")?;

        account.role = role;
        info!(username = %account.username, from = %previous, to = %role, by = %actor.username, "Role changed");
        Ok(account)
    }

    pub async fn deactivate_account(&self, actor: &Actor, username: &str) -> Result<Account, AppError> {
        self.require(actor, Permission::ManageAccounts)?;
        let mut account = self.load_account_by_username(username).await?;
        if account.id == actor.account_id {
            return Err(AppError::forbidden(actor.role, "deactivate their own account"));
        }

        let mut tx = self.repo.begin().await?;
        let changed = Repository::deactivate_account(&mut *tx, account.id).await?;
        if changed {
            Repository::insert_audit(
                &mut *tx,
                &AuditEntry::new(
                    Some(actor.account_id),
                    AuditAction::AccountDeactivated,
                    account.id.to_string(),
                    json!({ "username": account.username }),
                ),
            )
            .await?;
        }
        tx.commit().await.context("Failed to commit account deactivation")?;

        account.active = false;
        info!(username = %account.username, by = %actor.username, "Account deactivated");
        Ok(account)
    }

    // ========================
    // Request workflow
    // ========================

    /// File a leave request and notify the employee's direct manager.
    pub async fn submit_request(
        &self,
        actor: &Actor,
        application: LeaveApplication,
    ) -> Result<SubmissionResult, AppError> {
        if application.category.trim().is_empty() {
            return Err(AppError::MissingField("leave type"));
        }

        let employee = self.load_employee(&application.employee_id).await?;
        if !AccessPolicy::can_submit_for(actor, &employee) {
            return Err(AppError::forbidden(
                actor.role,
                format!("submit leave for employee {}", employee.id),
            ));
        }
        if !employee.active {
            return Err(AppError::EmployeeInactive(employee.id));
        }

        let request = VacationRequest::new(
            employee.id.clone(),
            application.category.trim(),
            application.start_date,
            application.end_date,
            application.reason.trim(),
        )
        .map_err(|e| AppError::from_request_error("new", e))?;

        let balance_check = self
            .compute_balance_check(&employee.id, request.balance_year(), &request.category, request.days_count)
            .await?;
        if self.balance_policy == BalancePolicy::BlockSubmission && !balance_check.is_sufficient() {
            warn!(employee_id = %employee.id, days = request.days_count, "Submission blocked by balance check");
            return Err(AppError::InsufficientBalance {
                employee_id: employee.id,
                year: balance_check.year,
                pool: balance_check.pool,
                available: balance_check.available.unwrap_or(0),
                requested: balance_check.requested,
            });
        }

        let manager_account = match &employee.direct_manager_id {
            Some(manager_id) => self.active_account_for(manager_id).await?,
            None => None,
        };

        let mut tx = self.repo.begin().await?;
        Repository::insert_request(&mut *tx, &request).await?;
        if let Some(manager) = &manager_account {
            let notification = Notification::new(
                manager.id,
                "New leave request",
                format!(
                    "{} requested {} day(s) of {} leave from {} to {}",
                    employee.name, request.days_count, request.category, request.start_date, request.end_date
                ),
            );
            Repository::insert_notification(&mut *tx, &notification).await?;
        } else {
            debug!(employee_id = %employee.id, "No active manager account to notify");
        }
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::RequestSubmitted,
                request.id.to_string(),
                json!({
                    "employee_id": request.employee_id,
                    "vacation_type": request.category,
                    "start_date": request.start_date,
                    "end_date": request.end_date,
                    "days_count": request.days_count,
                }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit leave request")?;

        info!(
            request_id = %request.id,
            employee_id = %request.employee_id,
            days = request.days_count,
            sufficient = balance_check.is_sufficient(),
            "Leave request submitted"
        );

        Ok(SubmissionResult {
            request,
            balance_check,
            manager_notified: manager_account.is_some(),
        })
    }

    /// Approve a pending request and deduct its days from the matching pool.
    ///
    /// The status change, deduction, notification and audit entry commit
    /// together; if the request stopped being pending in the meantime nothing
    /// is written.
    pub async fn approve_request(&self, actor: &Actor, id: RequestId) -> Result<VacationRequest, AppError> {
        self.require(actor, Permission::ReviewRequests)?;
        let mut request = self.load_request(id).await?;
        let employee = self.load_employee(&request.employee_id).await?;
        self.ensure_can_review(actor, &employee)?;

        request
            .approve(actor.account_id, Utc::now())
            .map_err(|e| AppError::from_request_error(id, e))?;

        let employee_account = self.active_account_for(&employee.id).await?;
        let pool = request.pool();
        let year = request.balance_year();

        let mut tx = self.repo.begin().await?;
        if !Repository::resolve_request(&mut *tx, &request).await? {
            drop(tx);
            return Err(self.request_conflict(id).await);
        }

        let Some(mut balance) = Repository::get_approved_balance(&mut *tx, &employee.id, year).await? else {
            warn!(request_id = %id, employee_id = %employee.id, year, "Approval needs an approved balance");
            return Err(AppError::NoApprovedBalance {
                employee_id: employee.id,
                year,
            });
        };
        balance.pools.deduct(pool, request.days_count);
        Repository::update_pools(&mut *tx, balance.id, &balance.pools).await?;

        if let Some(account) = &employee_account {
            let notification = Notification::new(
                account.id,
                "Leave request approved",
                format!(
                    "Your {} leave from {} to {} ({} day(s)) was approved",
                    request.category, request.start_date, request.end_date, request.days_count
                ),
            );
            Repository::insert_notification(&mut *tx, &notification).await?;
        }
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::RequestApproved,
                id.to_string(),
                json!({
                    "employee_id": employee.id,
                    "pool": pool,
                    "days": request.days_count,
                    "remaining": balance.pools.get(pool),
                }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit approval")?;

        info!(
            request_id = %id,
            employee_id = %employee.id,
            pool = %pool,
            remaining = balance.pools.get(pool),
            by = %actor.username,
            "Leave request approved"
        );
        Ok(request)
    }

    /// Reject a pending request with a reason the employee will see.
    pub async fn reject_request(
        &self,
        actor: &Actor,
        id: RequestId,
        reason: &str,
    ) -> Result<VacationRequest, AppError> {
        self.require(actor, Permission::ReviewRequests)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::MissingField("rejection reason"));
        }

        let mut request = self.load_request(id).await?;
        let employee = self.load_employee(&request.employee_id).await?;
        self.ensure_can_review(actor, &employee)?;

        request
            .reject(actor.account_id, reason, Utc::now())
            .map_err(|e| AppError::from_request_error(id, e))?;

        let employee_account = self.active_account_for(&employee.id).await?;

        let mut tx = self.repo.begin().await?;
        if !Repository::resolve_request(&mut *tx, &request).await? {
            drop(tx);
            return Err(self.request_conflict(id).await);
        }
        if let Some(account) = &employee_account {
            let notification = Notification::new(
                account.id,
                "Leave request rejected",
                format!(
                    "Your {} leave from {} to {} was rejected: {}",
                    request.category, request.start_date, request.end_date, reason
                ),
            );
            Repository::insert_notification(&mut *tx, &notification).await?;
        }
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::RequestRejected,
                id.to_string(),
                json!({ "employee_id": employee.id, "reason": reason }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit rejection")?;

        info!(request_id = %id, employee_id = %employee.id, by = %actor.username, "Leave request rejected");
        Ok(request)
    }

    /// Withdraw one's own pending request. Nothing was deducted yet, so
    /// balances are untouched.
    pub async fn cancel_request(&self, actor: &Actor, id: RequestId) -> Result<VacationRequest, AppError> {
        let mut request = self.load_request(id).await?;
        if !actor.is_self(&request.employee_id) {
            return Err(AppError::forbidden(
                actor.role,
                "cancel another employee's leave request",
            ));
        }

        request
            .cancel(Utc::now())
            .map_err(|e| AppError::from_request_error(id, e))?;

        let mut tx = self.repo.begin().await?;
        if !Repository::resolve_request(&mut *tx, &request).await? {
            drop(tx);
            return Err(self.request_conflict(id).await);
        }
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::RequestCancelled,
                id.to_string(),
                json!({ "employee_id": request.employee_id }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit cancellation")?;

        info!(request_id = %id, employee_id = %request.employee_id, "Leave request cancelled");
        Ok(request)
    }

    /// Requests the actor is allowed to see, newest first.
    ///
    /// Employees get their own, direct managers get their direct reports',
    /// admin officers and admins get everything.
    pub async fn list_visible_requests(&self, actor: &Actor) -> Result<Vec<VacationRequest>, AppError> {
        let requests = if AccessPolicy::allows(actor, Permission::ViewAllRequests) {
            self.repo.list_requests().await?
        } else if actor.has_at_least(Role::DirectManager) {
            self.repo.list_requests_for_manager(&actor.employee_id).await?
        } else {
            self.repo.list_requests_for_employee(&actor.employee_id).await?
        };
        Ok(requests)
    }

    /// The actor's own requests, whatever their role.
    pub async fn list_own_requests(&self, actor: &Actor) -> Result<Vec<VacationRequest>, AppError> {
        Ok(self.repo.list_requests_for_employee(&actor.employee_id).await?)
    }

    pub async fn get_request(&self, actor: &Actor, id: RequestId) -> Result<VacationRequest, AppError> {
        let request = self.load_request(id).await?;
        let employee = self.load_employee(&request.employee_id).await?;
        if !self.can_view(actor, &employee) {
            return Err(AppError::forbidden(actor.role, format!("view leave request {}", id)));
        }
        Ok(request)
    }

    // ========================
    // Balance ledger
    // ========================

    /// Propose a yearly balance. It stays unusable until an admin approves it.
    pub async fn propose_balance(
        &self,
        actor: &Actor,
        employee_id: &str,
        year: i32,
        pools: Pools,
    ) -> Result<VacationBalance, AppError> {
        self.require(actor, Permission::ProposeBalance)?;
        if !(1900..=9999).contains(&year) {
            return Err(AppError::InvalidValue(format!("year {}", year)));
        }
        if !pools.is_non_negative() {
            return Err(AppError::InvalidValue(
                "balance pools cannot be negative".to_string(),
            ));
        }

        let admins = self.repo.list_active_accounts_with_role(Role::Admin).await?;

        let mut tx = self.repo.begin().await?;
        let employee = load_employee_in(&mut *tx, employee_id).await?;
        if Repository::find_balance_for_year(&mut *tx, employee_id, year)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateBalance {
                employee_id: employee_id.to_string(),
                year,
            });
        }

        let balance = VacationBalance::propose(employee_id, year, pools, actor.account_id);
        Repository::insert_balance(&mut *tx, &balance).await?;
        for admin in &admins {
            let notification = Notification::new(
                admin.id,
                "Leave balance awaiting approval",
                format!(
                    "{} proposed the {} balance for {} ({}): regular {}, sick {}, emergency {}, other {}",
                    actor.username,
                    year,
                    employee.name,
                    employee.id,
                    pools.regular,
                    pools.sick,
                    pools.emergency,
                    pools.other
                ),
            );
            Repository::insert_notification(&mut *tx, &notification).await?;
        }
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                AuditAction::BalanceProposed,
                balance.id.to_string(),
                json!({ "employee_id": employee_id, "year": year, "pools": pools }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit balance proposal")?;

        info!(
            balance_id = %balance.id,
            employee_id,
            year,
            admins_notified = admins.len(),
            by = %actor.username,
            "Balance proposed"
        );
        Ok(balance)
    }

    pub async fn approve_balance(&self, actor: &Actor, id: BalanceId) -> Result<VacationBalance, AppError> {
        self.resolve_balance(actor, id, BalanceStatus::Approved).await
    }

    pub async fn reject_balance(&self, actor: &Actor, id: BalanceId) -> Result<VacationBalance, AppError> {
        self.resolve_balance(actor, id, BalanceStatus::Rejected).await
    }

    async fn resolve_balance(
        &self,
        actor: &Actor,
        id: BalanceId,
        status: BalanceStatus,
    ) -> Result<VacationBalance, AppError> {
        self.require(actor, Permission::ReviewBalance)?;
        let mut balance = self.load_balance(id).await?;
        if !balance.is_pending() {
            return Err(AppError::BalanceNotPending {
                id: id.to_string(),
                status: balance.status,
            });
        }

        // Approval is announced to the employee, rejection to whoever proposed it.
        let recipient = match status {
            BalanceStatus::Approved => self.active_account_for(&balance.employee_id).await?,
            _ => self
                .repo
                .get_account(balance.proposed_by)
                .await?
                .filter(|a| a.active),
        };

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        if !Repository::resolve_balance(&mut *tx, id, status, actor.account_id, now).await? {
            drop(tx);
            let current = self.load_balance(id).await?;
            return Err(AppError::BalanceNotPending {
                id: id.to_string(),
                status: current.status,
            });
        }
        if let Some(account) = &recipient {
            let (title, verb) = match status {
                BalanceStatus::Approved => ("Leave balance approved", "approved"),
                _ => ("Leave balance rejected", "rejected"),
            };
            let notification = Notification::new(
                account.id,
                title,
                format!(
                    "The {} leave balance for {} was {}",
                    balance.year, balance.employee_id, verb
                ),
            );
            Repository::insert_notification(&mut *tx, &notification).await?;
        }
        let action = match status {
            BalanceStatus::Approved => AuditAction::BalanceApproved,
            _ => AuditAction::BalanceRejected,
        };
        Repository::insert_audit(
            &mut *tx,
            &AuditEntry::new(
                Some(actor.account_id),
                action,
                id.to_string(),
                json!({ "employee_id": balance.employee_id, "year": balance.year }),
            ),
        )
        .await?;
        tx.commit().await.context("Failed to commit balance review")?;

        balance.status = status;
        balance.reviewed_by = Some(actor.account_id);
        balance.reviewed_at = Some(now);
        info!(balance_id = %id, status = %status, by = %actor.username, "Balance reviewed");
        Ok(balance)
    }

    /// Approved balances for an employee, most recent year first.
    pub async fn query_balance(&self, actor: &Actor, employee_id: &str) -> Result<Vec<VacationBalance>, AppError> {
        let employee = self.load_employee(employee_id).await?;
        if !self.can_view(actor, &employee) {
            return Err(AppError::forbidden(
                actor.role,
                format!("view balances of employee {}", employee_id),
            ));
        }
        Ok(self.repo.list_approved_balances(employee_id).await?)
    }

    /// Advisory check of whether the approved balance covers `days` of `category`.
    pub async fn check_balance(
        &self,
        actor: &Actor,
        employee_id: &str,
        year: i32,
        category: &str,
        days: Days,
    ) -> Result<BalanceCheck, AppError> {
        let employee = self.load_employee(employee_id).await?;
        if !self.can_view(actor, &employee) {
            return Err(AppError::forbidden(
                actor.role,
                format!("view balances of employee {}", employee_id),
            ));
        }
        self.compute_balance_check(employee_id, year, category, days).await
    }

    pub async fn list_pending_balances(&self, actor: &Actor) -> Result<Vec<VacationBalance>, AppError> {
        self.require(actor, Permission::ReviewBalance)?;
        Ok(self.repo.list_pending_balances().await?)
    }

    // ========================
    // Notifications & audit
    // ========================

    pub async fn list_notifications(&self, actor: &Actor, unread_only: bool) -> Result<Vec<Notification>, AppError> {
        Ok(self
            .repo
            .list_notifications(actor.account_id, unread_only)
            .await?)
    }

    /// Mark one of the actor's notifications as read. Marking twice is harmless.
    pub async fn mark_read(&self, actor: &Actor, id: NotificationId) -> Result<Notification, AppError> {
        let mut notification = self
            .repo
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::NotificationNotFound(id.to_string()))?;
        if notification.account_id != actor.account_id {
            return Err(AppError::forbidden(
                actor.role,
                "read another user's notifications",
            ));
        }
        if !notification.is_read {
            self.repo.mark_notification_read(id).await?;
            notification.is_read = true;
        }
        Ok(notification)
    }

    pub async fn list_audit_log(&self, actor: &Actor, limit: Option<usize>) -> Result<Vec<AuditEntry>, AppError> {
        self.require(actor, Permission::ViewAuditLog)?;
        Ok(self.repo.list_audit(limit).await?)
    }

    // ========================
    // Helpers
    // ========================

    fn require(&self, actor: &Actor, permission: Permission) -> Result<(), AppError> {
        if AccessPolicy::allows(actor, permission) {
            return Ok(());
        }
        warn!(user = %actor.username, role = %actor.role, ?permission, "Permission denied");
        Err(AppError::forbidden(actor.role, permission.describe()))
    }

    /// Visibility rule plus "you can always see yourself".
    fn can_view(&self, actor: &Actor, subject: &Employee) -> bool {
        actor.is_self(&subject.id) || AccessPolicy::can_view(actor, subject)
    }

    fn ensure_can_review(&self, actor: &Actor, subject: &Employee) -> Result<(), AppError> {
        if AccessPolicy::can_review(actor, subject) {
            return Ok(());
        }
        warn!(user = %actor.username, employee_id = %subject.id, "Review denied: not the employee's manager");
        Err(AppError::forbidden(
            actor.role,
            format!("review leave requests of employee {}", subject.id),
        ))
    }

    async fn load_employee(&self, id: &str) -> Result<Employee, AppError> {
        self.repo
            .get_employee(id)
            .await?
            .ok_or_else(|| AppError::EmployeeNotFound(id.to_string()))
    }

    async fn load_account_by_username(&self, username: &str) -> Result<Account, AppError> {
        self.repo
            .get_account_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::AccountNotFound(username.to_string()))
    }

    async fn load_request(&self, id: RequestId) -> Result<VacationRequest, AppError> {
        self.repo
            .get_request(id)
            .await?
            .ok_or_else(|| AppError::RequestNotFound(id.to_string()))
    }

    async fn load_balance(&self, id: BalanceId) -> Result<VacationBalance, AppError> {
        self.repo
            .get_balance(id)
            .await?
            .ok_or_else(|| AppError::BalanceNotFound(id.to_string()))
    }

    async fn active_account_for(&self, employee_id: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .repo
            .get_account_for_employee(employee_id)
            .await?
            .filter(|a| a.active))
    }

    /// Error for a request that stopped being pending while we were working on it.
    async fn request_conflict(&self, id: RequestId) -> AppError {
        match self.repo.get_request(id).await {
            Ok(Some(current)) => {
                warn!(request_id = %id, status = %current.status, "Request already resolved");
                AppError::RequestNotPending {
                    id: id.to_string(),
                    status: current.status,
                }
            }
            Ok(None) => AppError::RequestNotFound(id.to_string()),
            Err(e) => e.into(),
        }
    }

    async fn compute_balance_check(
        &self,
        employee_id: &str,
        year: i32,
        category: &str,
        days: Days,
    ) -> Result<BalanceCheck, AppError> {
        let balance = self
            .repo
            .list_approved_balances(employee_id)
            .await?
            .into_iter()
            .find(|b| b.year == year && b.is_usable());

        Ok(BalanceCheck {
            employee_id: employee_id.to_string(),
            year,
            pool: LeavePool::for_category(category),
            available: balance.map(|b| b.available(category)),
            requested: days,
        })
    }
}

async fn load_employee_in(conn: &mut SqliteConnection, id: &str) -> Result<Employee, AppError> {
    Repository::find_employee(conn, id)
        .await?
        .ok_or_else(|| AppError::EmployeeNotFound(id.to_string()))
}

fn ensure_active_manager(employees: &[Employee], manager_id: &str) -> Result<(), AppError> {
    match employees.iter().find(|e| e.id == manager_id) {
        Some(manager) if manager.active => Ok(()),
        Some(manager) => Err(AppError::EmployeeInactive(manager.id.clone())),
        None => Err(AppError::EmployeeNotFound(manager_id.to_string())),
    }
}

fn hash(password: &str) -> Result<String, AppError> {
    hash_password(password).map_err(|e| AppError::PasswordHash(e.to_string()))
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    if username.trim().is_empty() {
        return Err(AppError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(AppError::MissingField("password"));
    }
    Ok(())
}

fn validate_new_employee(employee: &NewEmployee) -> Result<(), AppError> {
    if employee.id.trim().is_empty() {
        return Err(AppError::MissingField("employee id"));
    }
    if employee.name.trim().is_empty() {
        return Err(AppError::MissingField("name"));
    }
    Ok(())
}

fn build_employee(new: NewEmployee) -> Employee {
    let employee = Employee::new(new.id, new.name, new.department, new.position, new.hire_date);
    match new.direct_manager_id {
        Some(manager_id) => employee.with_manager(manager_id),
        None => employee,
    }
}

fn link_error(err: LinkError) -> AppError {
    match err {
        LinkError::UnknownEmployee(id) => AppError::EmployeeNotFound(id),
        other => AppError::InvalidManagerLink(other),
    }
}
