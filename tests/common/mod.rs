// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use leavebook::application::{LeaveApplication, LeaveService, NewEmployee};
use leavebook::domain::{Actor, Pools, Role, VacationBalance};
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LeaveService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LeaveService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a YYYY-MM-DD date
pub fn date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

pub fn new_employee(id: &str, name: &str, manager: Option<&str>) -> NewEmployee {
    NewEmployee {
        id: id.to_string(),
        name: name.to_string(),
        department: "Operations".to_string(),
        position: "Staff".to_string(),
        direct_manager_id: manager.map(str::to_string),
        hire_date: date("2020-01-06"),
    }
}

pub fn leave(employee_id: &str, category: &str, start: &str, end: &str) -> LeaveApplication {
    LeaveApplication {
        employee_id: employee_id.to_string(),
        category: category.to_string(),
        start_date: date(start),
        end_date: date(end),
        reason: "Family matters".to_string(),
    }
}

/// Test fixture: a small organisation with one account per role.
///
/// ```text
/// A1 (admin)   O1 (admin_officer)
/// M1 (direct_manager) <- E1 (employee)
/// M2 (direct_manager) <- E2 (employee)
/// ```
pub struct Org {
    pub admin: Actor,
    pub officer: Actor,
    pub manager: Actor,
    pub manager2: Actor,
    pub e1: Actor,
    pub e2: Actor,
}

impl Org {
    pub async fn create(service: &LeaveService) -> Result<Self> {
        let admin = service
            .bootstrap(new_employee("A1", "Amal Admin", None), "admin", PASSWORD)
            .await?;

        let people = [
            ("O1", "Omar Officer", None),
            ("M1", "Mona Manager", None),
            ("M2", "Maher Manager", None),
            ("E1", "Eman Employee", Some("M1")),
            ("E2", "Essam Employee", Some("M2")),
        ];
        for (id, name, manager) in people {
            service
                .add_employee(&admin, new_employee(id, name, manager))
                .await?;
        }

        let officer = Self::account(service, &admin, "officer", "O1", Role::AdminOfficer).await?;
        let manager = Self::account(service, &admin, "manager", "M1", Role::DirectManager).await?;
        let manager2 =
            Self::account(service, &admin, "manager2", "M2", Role::DirectManager).await?;
        let e1 = Self::account(service, &admin, "e1", "E1", Role::Employee).await?;
        let e2 = Self::account(service, &admin, "e2", "E2", Role::Employee).await?;

        Ok(Self {
            admin,
            officer,
            manager,
            manager2,
            e1,
            e2,
        })
    }

    async fn account(
        service: &LeaveService,
        admin: &Actor,
        username: &str,
        employee_id: &str,
        role: Role,
    ) -> Result<Actor> {
        let account = service
            .create_account(admin, username, PASSWORD, employee_id, role)
            .await?;
        Ok(Actor::from_account(&account))
    }

    /// Propose (as the officer) and approve (as the admin) a yearly balance.
    pub async fn approved_balance(
        &self,
        service: &LeaveService,
        employee_id: &str,
        year: i32,
        pools: Pools,
    ) -> Result<VacationBalance> {
        let proposed = service
            .propose_balance(&self.officer, employee_id, year, pools)
            .await?;
        Ok(service.approve_balance(&self.admin, proposed.id).await?)
    }
}

/// Approved pools for (employee, year), looked up as the admin.
pub async fn pools_for(
    service: &LeaveService,
    org: &Org,
    employee_id: &str,
    year: i32,
) -> Result<Pools> {
    let balances = service.query_balance(&org.admin, employee_id).await?;
    balances
        .into_iter()
        .find(|b| b.year == year)
        .map(|b| b.pools)
        .ok_or_else(|| anyhow::anyhow!("no approved {} balance for {}", year, employee_id))
}
