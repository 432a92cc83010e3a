use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::Level;
use uuid::Uuid;

use crate::application::{LeaveApplication, LeaveService, NewEmployee};
use crate::config::{BalancePolicy, Config};
use crate::domain::{Actor, Days, Employee, Pools, Role, VacationBalance, VacationRequest};

/// Leavebook - leave requests, balances and approvals
#[derive(Parser)]
#[command(name = "leavebook")]
#[command(about = "Leave request and balance management with role-based approvals")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides LEAVEBOOK_DATABASE)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Balance check on submission: advisory or submit (overrides LEAVEBOOK_BALANCE_CHECK)
    #[arg(long, global = true)]
    pub balance_check: Option<String>,

    /// Username to sign in with
    #[arg(short, long, global = true, env = "LEAVEBOOK_USER")]
    pub user: Option<String>,

    /// Password to sign in with
    #[arg(short, long, global = true, env = "LEAVEBOOK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and create the first admin (--user/--password)
    Init {
        /// Employee ID of the admin
        #[arg(long)]
        employee_id: String,

        /// Full name of the admin
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "Administration")]
        department: String,

        #[arg(long, default_value = "Administrator")]
        position: String,

        /// Hire date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        hire_date: Option<String>,
    },

    /// Employee directory commands
    #[command(subcommand)]
    Employee(EmployeeCommands),

    /// User account commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Leave request commands
    #[command(subcommand)]
    Leave(LeaveCommands),

    /// Leave balance commands
    #[command(subcommand)]
    Balance(BalanceCommands),

    /// Notification commands
    #[command(subcommand)]
    Notifications(NotificationCommands),

    /// Show the audit log
    Audit {
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum EmployeeCommands {
    /// Add an employee to the directory
    Add {
        /// Employee ID (must be unique)
        id: String,

        /// Full name
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        department: String,

        #[arg(long, default_value = "")]
        position: String,

        /// Direct manager's employee ID
        #[arg(short, long)]
        manager: Option<String>,

        /// Hire date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        hire_date: Option<String>,
    },

    /// List employees
    List {
        /// Include deactivated employees
        #[arg(short, long)]
        all: bool,
    },

    /// Show employee details
    Show { id: String },

    /// Set or clear an employee's direct manager
    SetManager {
        id: String,

        /// New manager's employee ID (omit to clear)
        manager: Option<String>,
    },

    /// Deactivate an employee and their account
    Deactivate { id: String },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a login account for an employee
    Create {
        username: String,

        /// Employee the account belongs to
        #[arg(short, long)]
        employee: String,

        /// Role: employee, direct_manager, admin_officer, admin
        #[arg(short, long, default_value = "employee")]
        role: String,

        /// Initial password for the new account
        #[arg(long)]
        new_password: String,
    },

    /// List accounts
    List,

    /// Change an account's role
    SetRole { username: String, role: String },

    /// Deactivate an account
    Deactivate { username: String },
}

#[derive(Subcommand)]
pub enum LeaveCommands {
    /// Submit a leave request
    Submit {
        /// Leave type (e.g. annual, sick, emergency, casual)
        #[arg(short = 't', long = "type")]
        category: String,

        /// First day of leave (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last day of leave (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        #[arg(short, long, default_value = "")]
        reason: String,

        /// File on behalf of another employee (admin officers only)
        #[arg(short, long)]
        employee: Option<String>,
    },

    /// Approve a pending request
    Approve { id: String },

    /// Reject a pending request
    Reject {
        id: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Cancel one of your own pending requests
    Cancel { id: String },

    /// List the requests you are allowed to see
    List,

    /// List your own requests
    Mine,

    /// Show request details
    Show { id: String },
}

#[derive(Subcommand)]
pub enum BalanceCommands {
    /// Propose a yearly balance for an employee
    Propose {
        employee: String,

        #[arg(short, long)]
        year: i32,

        #[arg(long, default_value = "0")]
        regular: Days,

        #[arg(long, default_value = "0")]
        sick: Days,

        #[arg(long, default_value = "0")]
        emergency: Days,

        #[arg(long, default_value = "0")]
        other: Days,
    },

    /// Approve a proposed balance
    Approve { id: String },

    /// Reject a proposed balance
    Reject { id: String },

    /// Show approved balances (your own if no employee given)
    Show { employee: Option<String> },

    /// List balances awaiting approval
    Pending,

    /// Check whether a balance covers a number of days
    Check {
        /// Leave type
        #[arg(short = 't', long = "type")]
        category: String,

        #[arg(long)]
        days: Days,

        /// Year (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Employee to check (defaults to yourself)
        #[arg(short, long)]
        employee: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List your notifications
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Mark a notification as read
    Read { id: String },
}

impl Cli {
    /// Apply command-line flags on top of the environment configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Result<Config> {
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(value) = &self.balance_check {
            config.balance_policy = BalancePolicy::from_str(value).with_context(|| {
                format!("Invalid balance check '{}'. Valid values: advisory, submit", value)
            })?;
        }
        if self.verbose {
            config.log_level = Level::DEBUG;
        }
        Ok(config)
    }

    pub async fn run(self, config: Config) -> Result<()> {
        let Cli {
            user,
            password,
            command,
            ..
        } = self;

        match command {
            Commands::Init {
                employee_id,
                name,
                department,
                position,
                hire_date,
            } => {
                let (Some(username), Some(password)) = (user, password) else {
                    bail!("init needs --user and --password for the first admin account");
                };
                let service = LeaveService::init(&config.database).await?;
                let employee = NewEmployee {
                    id: employee_id,
                    name,
                    department,
                    position,
                    direct_manager_id: None,
                    hire_date: parse_optional_date(hire_date.as_deref())?,
                };
                let actor = service.bootstrap(employee, &username, &password).await?;
                println!("Database initialized: {}", config.database);
                println!("Created admin account: {} ({})", actor.username, actor.employee_id);
            }

            Commands::Employee(cmd) => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_employee_command(&service, &actor, cmd).await?;
            }

            Commands::Account(cmd) => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_account_command(&service, &actor, cmd).await?;
            }

            Commands::Leave(cmd) => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_leave_command(&service, &actor, cmd).await?;
            }

            Commands::Balance(cmd) => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_balance_command(&service, &actor, cmd).await?;
            }

            Commands::Notifications(cmd) => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_notification_command(&service, &actor, cmd).await?;
            }

            Commands::Audit { limit } => {
                let (service, actor) = sign_in(&config, user, password).await?;
                run_audit_command(&service, &actor, limit).await?;
            }
        }

        Ok(())
    }
}

async fn sign_in(
    config: &Config,
    user: Option<String>,
    password: Option<String>,
) -> Result<(LeaveService, Actor)> {
    let (Some(username), Some(password)) = (user, password) else {
        bail!("Sign in with --user and --password (or LEAVEBOOK_USER / LEAVEBOOK_PASSWORD)");
    };
    let service = LeaveService::connect(&config.database)
        .await?
        .with_balance_policy(config.balance_policy);
    let actor = service.authenticate(&username, &password).await?;
    Ok((service, actor))
}

async fn run_employee_command(
    service: &LeaveService,
    actor: &Actor,
    cmd: EmployeeCommands,
) -> Result<()> {
    match cmd {
        EmployeeCommands::Add {
            id,
            name,
            department,
            position,
            manager,
            hire_date,
        } => {
            let employee = service
                .add_employee(
                    actor,
                    NewEmployee {
                        id,
                        name,
                        department,
                        position,
                        direct_manager_id: manager,
                        hire_date: parse_optional_date(hire_date.as_deref())?,
                    },
                )
                .await?;
            println!("Added employee: {} ({})", employee.name, employee.id);
        }

        EmployeeCommands::List { all } => {
            let employees = service.list_employees(actor, all).await?;
            if employees.is_empty() {
                println!("No employees found.");
            } else {
                println!(
                    "{:<10} {:<24} {:<16} {:<10} {:<8}",
                    "ID", "NAME", "DEPARTMENT", "MANAGER", "ACTIVE"
                );
                println!("{}", "-".repeat(72));
                for e in employees {
                    println!(
                        "{:<10} {:<24} {:<16} {:<10} {:<8}",
                        e.id,
                        truncate(&e.name, 24),
                        truncate(&e.department, 16),
                        e.direct_manager_id.as_deref().unwrap_or("-"),
                        if e.active { "yes" } else { "no" }
                    );
                }
            }
        }

        EmployeeCommands::Show { id } => {
            let employee = service.get_employee(actor, &id).await?;
            print_employee(&employee);
        }

        EmployeeCommands::SetManager { id, manager } => {
            let employee = service.set_manager(actor, &id, manager.as_deref()).await?;
            match &employee.direct_manager_id {
                Some(m) => println!("{} now reports to {}", employee.id, m),
                None => println!("{} has no direct manager", employee.id),
            }
        }

        EmployeeCommands::Deactivate { id } => {
            service.deactivate_employee(actor, &id).await?;
            println!("Deactivated employee: {}", id);
        }
    }
    Ok(())
}

async fn run_account_command(
    service: &LeaveService,
    actor: &Actor,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            username,
            employee,
            role,
            new_password,
        } => {
            let role = parse_role(&role)?;
            let account = service
                .create_account(actor, &username, &new_password, &employee, role)
                .await?;
            println!(
                "Created account: {} for {} ({})",
                account.username, account.employee_id, account.role
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts(actor).await?;
            println!(
                "{:<20} {:<10} {:<16} {:<8}",
                "USERNAME", "EMPLOYEE", "ROLE", "ACTIVE"
            );
            println!("{}", "-".repeat(56));
            for a in accounts {
                println!(
                    "{:<20} {:<10} {:<16} {:<8}",
                    a.username,
                    a.employee_id,
                    a.role.as_str(),
                    if a.active { "yes" } else { "no" }
                );
            }
        }

        AccountCommands::SetRole { username, role } => {
            let account = service.set_role(actor, &username, parse_role(&role)?).await?;
            println!("{} is now {}", account.username, account.role);
        }

        AccountCommands::Deactivate { username } => {
            service.deactivate_account(actor, &username).await?;
            println!("Deactivated account: {}", username);
        }
    }
    Ok(())
}

async fn run_leave_command(service: &LeaveService, actor: &Actor, cmd: LeaveCommands) -> Result<()> {
    match cmd {
        LeaveCommands::Submit {
            category,
            from,
            to,
            reason,
            employee,
        } => {
            let result = service
                .submit_request(
                    actor,
                    LeaveApplication {
                        employee_id: employee.unwrap_or_else(|| actor.employee_id.clone()),
                        category,
                        start_date: parse_date(&from)?,
                        end_date: parse_date(&to)?,
                        reason,
                    },
                )
                .await?;

            let request = &result.request;
            println!(
                "Submitted {} leave: {} to {} ({} day(s)) [{}]",
                request.category, request.start_date, request.end_date, request.days_count, request.id
            );
            let check = &result.balance_check;
            match check.available {
                Some(available) if check.is_sufficient() => {
                    println!("  {} balance for {}: {} day(s) available", check.pool, check.year, available)
                }
                Some(available) => println!(
                    "  Warning: {} balance for {} has only {} day(s) available",
                    check.pool, check.year, available
                ),
                None => println!("  Warning: no approved balance for {}", check.year),
            }
            if !result.manager_notified {
                println!("  Note: no direct manager account was notified");
            }
        }

        LeaveCommands::Approve { id } => {
            let request = service.approve_request(actor, parse_id(&id, "request")?).await?;
            println!(
                "Approved {} leave for {}: {} day(s) deducted",
                request.category, request.employee_id, request.days_count
            );
        }

        LeaveCommands::Reject { id, reason } => {
            let request = service
                .reject_request(actor, parse_id(&id, "request")?, &reason)
                .await?;
            println!("Rejected leave request {} for {}", request.id, request.employee_id);
        }

        LeaveCommands::Cancel { id } => {
            let request = service.cancel_request(actor, parse_id(&id, "request")?).await?;
            println!("Cancelled leave request {}", request.id);
        }

        LeaveCommands::List => {
            let requests = service.list_visible_requests(actor).await?;
            print_requests(&requests);
        }

        LeaveCommands::Mine => {
            let requests = service.list_own_requests(actor).await?;
            print_requests(&requests);
        }

        LeaveCommands::Show { id } => {
            let r = service.get_request(actor, parse_id(&id, "request")?).await?;
            println!("Leave request: {}", r.id);
            println!("  Employee:   {}", r.employee_id);
            println!("  Type:       {} ({} pool)", r.category, r.pool());
            println!("  Dates:      {} to {}", r.start_date, r.end_date);
            println!("  Days:       {}", r.days_count);
            println!("  Reason:     {}", r.reason);
            println!("  Status:     {}", r.status);
            if let Some(reason) = &r.rejection_reason {
                println!("  Rejection:  {}", reason);
            }
            println!("  Submitted:  {}", r.created_at.format("%Y-%m-%d %H:%M:%S"));
            if let Some(at) = r.reviewed_at {
                println!("  Resolved:   {}", at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}

async fn run_balance_command(
    service: &LeaveService,
    actor: &Actor,
    cmd: BalanceCommands,
) -> Result<()> {
    match cmd {
        BalanceCommands::Propose {
            employee,
            year,
            regular,
            sick,
            emergency,
            other,
        } => {
            let balance = service
                .propose_balance(actor, &employee, year, Pools::new(regular, sick, emergency, other))
                .await?;
            println!(
                "Proposed {} balance for {} ({} days total) [{}]",
                balance.year,
                balance.employee_id,
                balance.pools.total(),
                balance.id
            );
        }

        BalanceCommands::Approve { id } => {
            let balance = service.approve_balance(actor, parse_id(&id, "balance")?).await?;
            println!("Approved {} balance for {}", balance.year, balance.employee_id);
        }

        BalanceCommands::Reject { id } => {
            let balance = service.reject_balance(actor, parse_id(&id, "balance")?).await?;
            println!("Rejected {} balance for {}", balance.year, balance.employee_id);
        }

        BalanceCommands::Show { employee } => {
            let employee_id = employee.unwrap_or_else(|| actor.employee_id.clone());
            let balances = service.query_balance(actor, &employee_id).await?;
            if balances.is_empty() {
                println!("No approved balances for {}.", employee_id);
            } else {
                print_balances(&balances);
            }
        }

        BalanceCommands::Pending => {
            let balances = service.list_pending_balances(actor).await?;
            if balances.is_empty() {
                println!("No balances awaiting approval.");
            } else {
                print_balances(&balances);
            }
        }

        BalanceCommands::Check {
            category,
            days,
            year,
            employee,
        } => {
            let employee_id = employee.unwrap_or_else(|| actor.employee_id.clone());
            let year = year.unwrap_or_else(|| Utc::now().year());
            let check = service
                .check_balance(actor, &employee_id, year, &category, days)
                .await?;
            match check.available {
                Some(available) => println!(
                    "{} {} balance for {}: {} available, {} requested: {}",
                    check.employee_id,
                    check.pool,
                    check.year,
                    available,
                    check.requested,
                    if check.is_sufficient() { "sufficient" } else { "insufficient" }
                ),
                None => println!(
                    "{} has no approved balance for {}",
                    check.employee_id, check.year
                ),
            }
        }
    }
    Ok(())
}

async fn run_notification_command(
    service: &LeaveService,
    actor: &Actor,
    cmd: NotificationCommands,
) -> Result<()> {
    match cmd {
        NotificationCommands::List { unread } => {
            let notifications = service.list_notifications(actor, unread).await?;
            if notifications.is_empty() {
                println!("No notifications.");
            }
            for n in notifications {
                println!(
                    "{} {} [{}] {}",
                    if n.is_read { " " } else { "*" },
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.id,
                    n.title
                );
                println!("    {}", n.message);
            }
        }

        NotificationCommands::Read { id } => {
            let notification = service.mark_read(actor, parse_id(&id, "notification")?).await?;
            println!("Marked as read: {}", notification.title);
        }
    }
    Ok(())
}

async fn run_audit_command(service: &LeaveService, actor: &Actor, limit: Option<usize>) -> Result<()> {
    let entries = service.list_audit_log(actor, limit).await?;
    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!(
        "{:<20} {:<22} {:<38} {}",
        "TIME", "ACTION", "ENTITY", "DETAILS"
    );
    println!("{}", "-".repeat(100));
    for entry in entries {
        println!(
            "{:<20} {:<22} {:<38} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action.as_str(),
            entry.entity_id,
            entry.details
        );
    }
    Ok(())
}

fn print_employee(e: &Employee) {
    println!("Employee: {}", e.name);
    println!("  ID:          {}", e.id);
    println!("  Department:  {}", e.department);
    println!("  Position:    {}", e.position);
    println!(
        "  Manager:     {}",
        e.direct_manager_id.as_deref().unwrap_or("-")
    );
    println!("  Hired:       {}", e.hire_date);
    println!("  Active:      {}", if e.active { "yes" } else { "no" });
}

fn print_requests(requests: &[VacationRequest]) {
    if requests.is_empty() {
        println!("No leave requests found.");
        return;
    }

    println!(
        "{:<36} {:<10} {:<14} {:<10} {:<10} {:>4} {:<10}",
        "ID", "EMPLOYEE", "TYPE", "FROM", "TO", "DAYS", "STATUS"
    );
    println!("{}", "-".repeat(100));
    for r in requests {
        println!(
            "{:<36} {:<10} {:<14} {:<10} {:<10} {:>4} {:<10}",
            r.id,
            r.employee_id,
            truncate(&r.category, 14),
            r.start_date,
            r.end_date,
            r.days_count,
            r.status.as_str()
        );
    }
}

fn print_balances(balances: &[VacationBalance]) {
    println!(
        "{:<36} {:<10} {:<6} {:>8} {:>6} {:>10} {:>6} {:<10}",
        "ID", "EMPLOYEE", "YEAR", "REGULAR", "SICK", "EMERGENCY", "OTHER", "STATUS"
    );
    println!("{}", "-".repeat(100));
    for b in balances {
        println!(
            "{:<36} {:<10} {:<6} {:>8} {:>6} {:>10} {:>6} {:<10}",
            b.id,
            b.employee_id,
            b.year,
            b.pools.regular,
            b.pools.sick,
            b.pools.emergency,
            b.pools.other,
            b.status.as_str()
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn parse_optional_date(date_str: Option<&str>) -> Result<NaiveDate> {
    match date_str {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid {} ID format (expected UUID)", what))
}

fn parse_role(role: &str) -> Result<Role> {
    Role::from_str(role).with_context(|| {
        format!(
            "Invalid role '{}'. Valid roles: employee, direct_manager, admin_officer, admin",
            role
        )
    })
}
