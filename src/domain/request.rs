use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Days, EmployeeId, LeavePool};

pub type RequestId = Uuid;

/// Review state of a leave request. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive length of a leave period, or `None` when it ends before it starts.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Option<Days> {
    if end < start {
        return None;
    }
    Some((end - start).num_days() + 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    NotPending(RequestStatus),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::EndBeforeStart { start, end } => {
                write!(f, "End date {} is before start date {}", end, start)
            }
            RequestError::NotPending(status) => {
                write!(f, "Request is already {}", status)
            }
        }
    }
}

impl std::error::Error for RequestError {}

/// A leave request. Once it leaves `Pending` it is never modified again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacationRequest {
    pub id: RequestId,
    pub employee_id: EmployeeId,
    /// Free-form leave category, mapped onto a pool with [`LeavePool::for_category`]
    pub category: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_count: Days,
    pub reason: String,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    /// Account that approved or rejected the request
    pub reviewed_by: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl VacationRequest {
    pub fn new(
        employee_id: impl Into<EmployeeId>,
        category: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let days_count = days_between(start_date, end_date).ok_or(RequestError::EndBeforeStart {
            start: start_date,
            end: end_date,
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            employee_id: employee_id.into(),
            category: category.into(),
            start_date,
            end_date,
            days_count,
            reason: reason.into(),
            status: RequestStatus::Pending,
            rejection_reason: None,
            reviewed_by: None,
            created_at: Utc::now(),
            reviewed_at: None,
        })
    }

    pub fn pool(&self) -> LeavePool {
        LeavePool::for_category(&self.category)
    }

    /// Balance year the request draws from: the year it starts in.
    pub fn balance_year(&self) -> i32 {
        self.start_date.year()
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    fn ensure_pending(&self) -> Result<(), RequestError> {
        if self.status.is_terminal() {
            Err(RequestError::NotPending(self.status))
        } else {
            Ok(())
        }
    }

    pub fn approve(&mut self, reviewer: AccountId, at: DateTime<Utc>) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Approved;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(at);
        Ok(())
    }

    pub fn reject(
        &mut self,
        reviewer: AccountId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(at);
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Cancelled;
        self.reviewed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sick_leave() -> VacationRequest {
        VacationRequest::new("E1", "sick", date("2024-03-01"), date("2024-03-03"), "flu").unwrap()
    }

    #[test]
    fn test_days_count_is_inclusive() {
        let req = sick_leave();
        assert_eq!(req.days_count, 3);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.pool(), LeavePool::Sick);
        assert_eq!(req.balance_year(), 2024);
    }

    #[test]
    fn test_single_day_request() {
        let req =
            VacationRequest::new("E1", "annual", date("2024-07-10"), date("2024-07-10"), "")
                .unwrap();
        assert_eq!(req.days_count, 1);
    }

    #[test]
    fn test_days_across_month_and_leap_day() {
        assert_eq!(days_between(date("2024-02-28"), date("2024-03-01")), Some(3));
        assert_eq!(days_between(date("2023-12-31"), date("2024-01-01")), Some(2));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = VacationRequest::new("E1", "sick", date("2024-03-05"), date("2024-03-01"), "x")
            .unwrap_err();
        assert!(matches!(err, RequestError::EndBeforeStart { .. }));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::from_str(status.as_str()), Some(status));
        }
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let reviewer = Uuid::new_v4();
        let now = Utc::now();

        let mut approved = sick_leave();
        approved.approve(reviewer, now).unwrap();
        assert_eq!(
            approved.reject(reviewer, "late", now),
            Err(RequestError::NotPending(RequestStatus::Approved))
        );
        assert_eq!(
            approved.cancel(now),
            Err(RequestError::NotPending(RequestStatus::Approved))
        );

        let mut rejected = sick_leave();
        rejected.reject(reviewer, "no cover", now).unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("no cover"));
        assert_eq!(
            rejected.approve(reviewer, now),
            Err(RequestError::NotPending(RequestStatus::Rejected))
        );
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let mut cancelled = sick_leave();
        cancelled.cancel(now).unwrap();
        assert!(cancelled.approve(reviewer, now).is_err());
        assert!(cancelled.reviewed_by.is_none());
    }
}
