use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AuditAction, AuditEntry, BalanceId, BalanceStatus, Employee,
    Notification, NotificationId, Pools, RequestId, RequestStatus, Role, VacationBalance,
    VacationRequest,
};

use super::MIGRATION_001_INITIAL;

const EMPLOYEE_COLUMNS: &str =
    "id, name, department, position, direct_manager_id, active, hire_date, created_at";
const ACCOUNT_COLUMNS: &str = "id, username, password_hash, employee_id, role, active, created_at";
const BALANCE_COLUMNS: &str = "id, employee_id, year, regular, sick, emergency, other, status, proposed_by, reviewed_by, created_at, reviewed_at";
const REQUEST_COLUMNS: &str = "r.id, r.employee_id, r.vacation_type, r.start_date, r.end_date, r.days_count, r.reason, r.status, r.rejection_reason, r.reviewed_by, r.created_at, r.reviewed_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, is_read, created_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository for persisting and querying the directory, balances, requests,
/// notifications and the audit log.
///
/// Reads go through the pool. Writes take a connection so the service can
/// group them into a single transaction with [`Repository::begin`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    ///
    /// The pool holds a single connection: SQLite allows one writer at a
    /// time, and queueing at the pool keeps concurrent transactions from
    /// failing with `SQLITE_BUSY` mid-flight.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a transaction. Dropping it without `commit` rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to start transaction")
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    // ========================
    // Employee operations
    // ========================

    pub async fn insert_employee(conn: &mut SqliteConnection, employee: &Employee) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, name, department, position, direct_manager_id, active, hire_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&employee.id)
        .bind(&employee.name)
        .bind(&employee.department)
        .bind(&employee.position)
        .bind(&employee.direct_manager_id)
        .bind(employee.active)
        .bind(employee.hire_date.format(DATE_FORMAT).to_string())
        .bind(timestamp(employee.created_at))
        .execute(conn)
        .await
        .context("Failed to save employee")?;
        Ok(())
    }

    pub async fn get_employee(&self, id: &str) -> Result<Option<Employee>> {
        let mut conn = self.acquire().await?;
        Self::find_employee(&mut conn, id).await
    }

    pub async fn find_employee(conn: &mut SqliteConnection, id: &str) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("Failed to fetch employee")?;

        row.as_ref().map(Self::row_to_employee).transpose()
    }

    /// List employees ordered by id, optionally including deactivated ones.
    pub async fn list_employees(&self, include_inactive: bool) -> Result<Vec<Employee>> {
        let mut conn = self.acquire().await?;
        Self::load_employees(&mut conn, include_inactive).await
    }

    pub async fn load_employees(
        conn: &mut SqliteConnection,
        include_inactive: bool,
    ) -> Result<Vec<Employee>> {
        let query = if include_inactive {
            format!("SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY id")
        } else {
            format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE active = 1 ORDER BY id")
        };

        let rows = sqlx::query(&query)
            .fetch_all(conn)
            .await
            .context("Failed to list employees")?;

        rows.iter().map(Self::row_to_employee).collect()
    }

    pub async fn set_manager(
        conn: &mut SqliteConnection,
        id: &str,
        manager_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE employees SET direct_manager_id = ? WHERE id = ?")
            .bind(manager_id)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update manager")?;
        Ok(())
    }

    /// Deactivate an employee. Returns false if the employee was already inactive.
    pub async fn deactivate_employee(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE employees SET active = 0 WHERE id = ? AND active = 1")
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to deactivate employee")?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_employee(row: &SqliteRow) -> Result<Employee> {
        let hire_date_str: String = row.get("hire_date");
        let created_at_str: String = row.get("created_at");

        Ok(Employee {
            id: row.get("id"),
            name: row.get("name"),
            department: row.get("department"),
            position: row.get("position"),
            direct_manager_id: row.get("direct_manager_id"),
            active: row.get::<i32, _>("active") != 0,
            hire_date: parse_date(&hire_date_str).context("Invalid hire_date")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Account operations
    // ========================

    pub async fn count_accounts(conn: &mut SqliteConnection) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(conn)
            .await
            .context("Failed to count accounts")?;
        Ok(row.get("count"))
    }

    pub async fn insert_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, employee_id, role, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.employee_id)
        .bind(account.role.as_str())
        .bind(account.active)
        .bind(timestamp(account.created_at))
        .execute(conn)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Usernames are matched case-insensitively.
    pub async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let mut conn = self.acquire().await?;
        Self::find_account_by_username(&mut conn, username).await
    }

    pub async fn find_account_by_username(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE username = ? COLLATE NOCASE"
        ))
        .bind(username)
        .fetch_optional(conn)
        .await
        .context("Failed to fetch account by username")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn get_account_for_employee(&self, employee_id: &str) -> Result<Option<Account>> {
        let mut conn = self.acquire().await?;
        Self::find_account_for_employee(&mut conn, employee_id).await
    }

    pub async fn find_account_for_employee(
        conn: &mut SqliteConnection,
        employee_id: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE employee_id = ?"
        ))
        .bind(employee_id)
        .fetch_optional(conn)
        .await
        .context("Failed to fetch account for employee")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Active accounts holding exactly `role`.
    pub async fn list_active_accounts_with_role(&self, role: Role) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE role = ? AND active = 1 ORDER BY username"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts by role")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    pub async fn set_role(conn: &mut SqliteConnection, id: AccountId, role: Role) -> Result<()> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id.to_string())
            .execute(conn)
            .await
            .context("Failed to update role")?;
        Ok(())
    }

    pub async fn deactivate_account(conn: &mut SqliteConnection, id: AccountId) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET active = 0 WHERE id = ? AND active = 1")
            .bind(id.to_string())
            .execute(conn)
            .await
            .context("Failed to deactivate account")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn deactivate_accounts_for_employee(
        conn: &mut SqliteConnection,
        employee_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query("UPDATE users SET active = 0 WHERE employee_id = ? AND active = 1")
            .bind(employee_id)
            .execute(conn)
            .await
            .context("Failed to deactivate accounts for employee")?;
        Ok(result.rows_affected())
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            employee_id: row.get("employee_id"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            active: row.get::<i32, _>("active") != 0,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Balance operations
    // ========================

    pub async fn insert_balance(conn: &mut SqliteConnection, balance: &VacationBalance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vacation_balances (id, employee_id, year, regular, sick, emergency, other, status, proposed_by, reviewed_by, created_at, reviewed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(balance.id.to_string())
        .bind(&balance.employee_id)
        .bind(balance.year)
        .bind(balance.pools.regular)
        .bind(balance.pools.sick)
        .bind(balance.pools.emergency)
        .bind(balance.pools.other)
        .bind(balance.status.as_str())
        .bind(balance.proposed_by.to_string())
        .bind(balance.reviewed_by.map(|id| id.to_string()))
        .bind(timestamp(balance.created_at))
        .bind(balance.reviewed_at.map(timestamp))
        .execute(conn)
        .await
        .context("Failed to save balance")?;
        Ok(())
    }

    pub async fn get_balance(&self, id: BalanceId) -> Result<Option<VacationBalance>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM vacation_balances WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch balance")?;

        row.as_ref().map(Self::row_to_balance).transpose()
    }

    /// The balance row for (employee, year) in any status.
    pub async fn find_balance_for_year(
        conn: &mut SqliteConnection,
        employee_id: &str,
        year: i32,
    ) -> Result<Option<VacationBalance>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM vacation_balances WHERE employee_id = ? AND year = ?"
        ))
        .bind(employee_id)
        .bind(year)
        .fetch_optional(conn)
        .await
        .context("Failed to fetch balance for year")?;

        row.as_ref().map(Self::row_to_balance).transpose()
    }

    /// The approved balance row for (employee, year), read inside a transaction.
    pub async fn get_approved_balance(
        conn: &mut SqliteConnection,
        employee_id: &str,
        year: i32,
    ) -> Result<Option<VacationBalance>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM vacation_balances WHERE employee_id = ? AND year = ? AND status = 'approved'"
        ))
        .bind(employee_id)
        .bind(year)
        .fetch_optional(conn)
        .await
        .context("Failed to fetch approved balance")?;

        row.as_ref().map(Self::row_to_balance).transpose()
    }

    /// Approved balances for an employee, most recent year first.
    pub async fn list_approved_balances(&self, employee_id: &str) -> Result<Vec<VacationBalance>> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM vacation_balances WHERE employee_id = ? AND status = 'approved' ORDER BY year DESC"
        ))
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list balances")?;

        rows.iter().map(Self::row_to_balance).collect()
    }

    pub async fn list_pending_balances(&self) -> Result<Vec<VacationBalance>> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM vacation_balances WHERE status = 'pending' ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending balances")?;

        rows.iter().map(Self::row_to_balance).collect()
    }

    /// Move a pending balance to `status`. Returns false when the row was no
    /// longer pending, in which case nothing changed.
    pub async fn resolve_balance(
        conn: &mut SqliteConnection,
        id: BalanceId,
        status: BalanceStatus,
        reviewer: AccountId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vacation_balances
            SET status = ?, reviewed_by = ?, reviewed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(reviewer.to_string())
        .bind(timestamp(at))
        .bind(id.to_string())
        .execute(conn)
        .await
        .context("Failed to resolve balance")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_pools(conn: &mut SqliteConnection, id: BalanceId, pools: &Pools) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE vacation_balances
            SET regular = ?, sick = ?, emergency = ?, other = ?
            WHERE id = ? AND status = 'approved'
            "#,
        )
        .bind(pools.regular)
        .bind(pools.sick)
        .bind(pools.emergency)
        .bind(pools.other)
        .bind(id.to_string())
        .execute(conn)
        .await
        .context("Failed to update balance pools")?;
        Ok(())
    }

    fn row_to_balance(row: &SqliteRow) -> Result<VacationBalance> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let proposed_by_str: String = row.get("proposed_by");
        let reviewed_by_str: Option<String> = row.get("reviewed_by");
        let created_at_str: String = row.get("created_at");
        let reviewed_at_str: Option<String> = row.get("reviewed_at");

        Ok(VacationBalance {
            id: Uuid::parse_str(&id_str).context("Invalid balance ID")?,
            employee_id: row.get("employee_id"),
            year: row.get("year"),
            pools: Pools {
                regular: row.get("regular"),
                sick: row.get("sick"),
                emergency: row.get("emergency"),
                other: row.get("other"),
            },
            status: BalanceStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid balance status: {}", status_str))?,
            proposed_by: Uuid::parse_str(&proposed_by_str).context("Invalid proposed_by ID")?,
            reviewed_by: reviewed_by_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid reviewed_by ID")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            reviewed_at: reviewed_at_str
                .map(|s| parse_timestamp(&s))
                .transpose()
                .context("Invalid reviewed_at timestamp")?,
        })
    }

    // ========================
    // Request operations
    // ========================

    pub async fn insert_request(conn: &mut SqliteConnection, request: &VacationRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vacation_requests (id, employee_id, vacation_type, start_date, end_date, days_count, reason, status, rejection_reason, reviewed_by, created_at, reviewed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(&request.employee_id)
        .bind(&request.category)
        .bind(request.start_date.format(DATE_FORMAT).to_string())
        .bind(request.end_date.format(DATE_FORMAT).to_string())
        .bind(request.days_count)
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(request.reviewed_by.map(|id| id.to_string()))
        .bind(timestamp(request.created_at))
        .bind(request.reviewed_at.map(timestamp))
        .execute(conn)
        .await
        .context("Failed to save request")?;
        Ok(())
    }

    pub async fn get_request(&self, id: RequestId) -> Result<Option<VacationRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM vacation_requests r WHERE r.id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch request")?;

        row.as_ref().map(Self::row_to_request).transpose()
    }

    /// Requests filed for one employee, newest first.
    pub async fn list_requests_for_employee(&self, employee_id: &str) -> Result<Vec<VacationRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM vacation_requests r WHERE r.employee_id = ? ORDER BY r.created_at DESC, r.rowid DESC"
        ))
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list requests for employee")?;

        rows.iter().map(Self::row_to_request).collect()
    }

    /// Requests of employees whose direct manager is `manager_id`, newest first.
    pub async fn list_requests_for_manager(&self, manager_id: &str) -> Result<Vec<VacationRequest>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM vacation_requests r
            JOIN employees e ON e.id = r.employee_id
            WHERE e.direct_manager_id = ?
            ORDER BY r.created_at DESC, r.rowid DESC
            "#
        ))
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list requests for manager")?;

        rows.iter().map(Self::row_to_request).collect()
    }

    /// All requests, newest first.
    pub async fn list_requests(&self) -> Result<Vec<VacationRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM vacation_requests r ORDER BY r.created_at DESC, r.rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list requests")?;

        rows.iter().map(Self::row_to_request).collect()
    }

    /// Persist the resolution of a request that was pending.
    ///
    /// The update only matches while the stored row is still `pending`, so of
    /// two racing reviewers exactly one sees `true`.
    pub async fn resolve_request(conn: &mut SqliteConnection, request: &VacationRequest) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vacation_requests
            SET status = ?, rejection_reason = ?, reviewed_by = ?, reviewed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(request.reviewed_by.map(|id| id.to_string()))
        .bind(request.reviewed_at.map(timestamp))
        .bind(request.id.to_string())
        .execute(conn)
        .await
        .context("Failed to resolve request")?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_request(row: &SqliteRow) -> Result<VacationRequest> {
        let id_str: String = row.get("id");
        let start_str: String = row.get("start_date");
        let end_str: String = row.get("end_date");
        let status_str: String = row.get("status");
        let reviewed_by_str: Option<String> = row.get("reviewed_by");
        let created_at_str: String = row.get("created_at");
        let reviewed_at_str: Option<String> = row.get("reviewed_at");

        Ok(VacationRequest {
            id: Uuid::parse_str(&id_str).context("Invalid request ID")?,
            employee_id: row.get("employee_id"),
            category: row.get("vacation_type"),
            start_date: parse_date(&start_str).context("Invalid start_date")?,
            end_date: parse_date(&end_str).context("Invalid end_date")?,
            days_count: row.get("days_count"),
            reason: row.get("reason"),
            status: RequestStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid request status: {}", status_str))?,
            rejection_reason: row.get("rejection_reason"),
            reviewed_by: reviewed_by_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid reviewed_by ID")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            reviewed_at: reviewed_at_str
                .map(|s| parse_timestamp(&s))
                .transpose()
                .context("Invalid reviewed_at timestamp")?,
        })
    }

    // ========================
    // Notification operations
    // ========================

    pub async fn insert_notification(
        conn: &mut SqliteConnection,
        notification: &Notification,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.account_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(timestamp(notification.created_at))
        .execute(conn)
        .await
        .context("Failed to save notification")?;
        Ok(())
    }

    pub async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch notification")?;

        row.as_ref().map(Self::row_to_notification).transpose()
    }

    /// Notifications addressed to an account, newest first.
    pub async fn list_notifications(
        &self,
        account_id: AccountId,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let query = if unread_only {
            format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ? AND is_read = 0 ORDER BY created_at DESC, rowid DESC"
            )
        } else {
            format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ? ORDER BY created_at DESC, rowid DESC"
            )
        };

        let rows = sqlx::query(&query)
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list notifications")?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to mark notification read")?;
        Ok(())
    }

    fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let created_at_str: String = row.get("created_at");

        Ok(Notification {
            id: Uuid::parse_str(&id_str).context("Invalid notification ID")?,
            account_id: Uuid::parse_str(&user_id_str).context("Invalid notification user ID")?,
            title: row.get("title"),
            message: row.get("message"),
            is_read: row.get::<i32, _>("is_read") != 0,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Audit log
    // ========================

    pub async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<()> {
        let details = serde_json::to_string(&entry.details)?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, user_id, action, entity, entity_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.actor.map(|id| id.to_string()))
        .bind(entry.action.as_str())
        .bind(entry.entity())
        .bind(&entry.entity_id)
        .bind(&details)
        .bind(timestamp(entry.created_at))
        .execute(conn)
        .await
        .context("Failed to save audit entry")?;
        Ok(())
    }

    /// Most recent audit entries first.
    pub async fn list_audit(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let mut query = String::from(
            "SELECT id, user_id, action, entity_id, details, created_at FROM audit_log ORDER BY created_at DESC, rowid DESC",
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list audit log")?;

        rows.iter().map(Self::row_to_audit).collect()
    }

    fn row_to_audit(row: &SqliteRow) -> Result<AuditEntry> {
        let id_str: String = row.get("id");
        let user_id_str: Option<String> = row.get("user_id");
        let action_str: String = row.get("action");
        let details_str: String = row.get("details");
        let created_at_str: String = row.get("created_at");

        Ok(AuditEntry {
            id: Uuid::parse_str(&id_str).context("Invalid audit ID")?,
            actor: user_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid audit user ID")?,
            action: AuditAction::from_str(&action_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid audit action: {}", action_str))?,
            entity_id: row.get("entity_id"),
            details: serde_json::from_str(&details_str).context("Invalid audit details")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}
