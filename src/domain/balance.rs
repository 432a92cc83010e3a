use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, EmployeeId};

pub type BalanceId = Uuid;

/// Leave days. Pools are whole days and may go negative.
pub type Days = i64;

/// One of the four yearly allowances a leave category draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeavePool {
    Regular,
    Sick,
    Emergency,
    Other,
}

impl LeavePool {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeavePool::Regular => "regular",
            LeavePool::Sick => "sick",
            LeavePool::Emergency => "emergency",
            LeavePool::Other => "other",
        }
    }

    /// Map a free-form leave category onto the pool it draws from.
    ///
    /// Unknown categories, annual leave included, draw from the regular pool.
    pub fn for_category(category: &str) -> Self {
        match category.trim().to_lowercase().as_str() {
            "sick" | "مرضية" => LeavePool::Sick,
            "emergency" | "ظرف طارئ" => LeavePool::Emergency,
            "casual" | "عارضة" | "عرضة" => LeavePool::Other,
            _ => LeavePool::Regular,
        }
    }
}

impl std::fmt::Display for LeavePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approval state of a yearly balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    Pending,
    Approved,
    Rejected,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Pending => "pending",
            BalanceStatus::Approved => "approved",
            BalanceStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BalanceStatus::Pending),
            "approved" => Some(BalanceStatus::Approved),
            "rejected" => Some(BalanceStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four day allowances for one employee and year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pools {
    pub regular: Days,
    pub sick: Days,
    pub emergency: Days,
    pub other: Days,
}

impl Pools {
    pub fn new(regular: Days, sick: Days, emergency: Days, other: Days) -> Self {
        Self {
            regular,
            sick,
            emergency,
            other,
        }
    }

    pub fn get(&self, pool: LeavePool) -> Days {
        match pool {
            LeavePool::Regular => self.regular,
            LeavePool::Sick => self.sick,
            LeavePool::Emergency => self.emergency,
            LeavePool::Other => self.other,
        }
    }

    fn get_mut(&mut self, pool: LeavePool) -> &mut Days {
        match pool {
            LeavePool::Regular => &mut self.regular,
            LeavePool::Sick => &mut self.sick,
            LeavePool::Emergency => &mut self.emergency,
            LeavePool::Other => &mut self.other,
        }
    }

    /// Subtract `days` from one pool. There is no floor: the result may be negative.
    pub fn deduct(&mut self, pool: LeavePool, days: Days) {
        let slot = self.get_mut(pool);
        *slot = slot.saturating_sub(days);
    }

    pub fn is_non_negative(&self) -> bool {
        self.regular >= 0 && self.sick >= 0 && self.emergency >= 0 && self.other >= 0
    }

    /// Sum of all pools, saturating at the `Days` bounds.
    pub fn total(&self) -> Days {
        self.regular
            .saturating_add(self.sick)
            .saturating_add(self.emergency)
            .saturating_add(self.other)
    }
}

/// Yearly leave entitlement for one employee.
///
/// A row is proposed by an admin officer and only becomes usable once an
/// admin approves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacationBalance {
    pub id: BalanceId,
    pub employee_id: EmployeeId,
    pub year: i32,
    pub pools: Pools,
    pub status: BalanceStatus,
    pub proposed_by: AccountId,
    pub reviewed_by: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl VacationBalance {
    pub fn propose(
        employee_id: impl Into<EmployeeId>,
        year: i32,
        pools: Pools,
        proposed_by: AccountId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id: employee_id.into(),
            year,
            pools,
            status: BalanceStatus::Pending,
            proposed_by,
            reviewed_by: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == BalanceStatus::Pending
    }

    pub fn is_usable(&self) -> bool {
        self.status == BalanceStatus::Approved
    }

    pub fn available(&self, category: &str) -> Days {
        self.pools.get(LeavePool::for_category(category))
    }
}

/// Advisory answer to "does this employee have enough days left?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub employee_id: EmployeeId,
    pub year: i32,
    pub pool: LeavePool,
    /// `None` when there is no approved balance for the year
    pub available: Option<Days>,
    pub requested: Days,
}

impl BalanceCheck {
    pub fn is_sufficient(&self) -> bool {
        matches!(self.available, Some(available) if available >= self.requested)
    }
}
