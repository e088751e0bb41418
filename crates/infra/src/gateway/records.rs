use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use hrms_core::{AttendanceId, DomainError, DomainResult, EmployeeId, Entity, LeaveRequestId};

use super::table::EmployeeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub employee_id: EmployeeId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn new(
        employee_id: EmployeeId,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
        reason: impl Into<String>,
    ) -> DomainResult<Self> {
        if ends_on < starts_on {
            return Err(DomainError::validation("leave ends before it starts"));
        }
        Ok(Self {
            id: LeaveRequestId::new(),
            employee_id,
            starts_on,
            ends_on,
            reason: reason.into(),
            status: LeaveStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Only pending requests can be decided.
    pub fn decide(&mut self, approve: bool) -> DomainResult<()> {
        if self.status != LeaveStatus::Pending {
            return Err(DomainError::invariant("leave request already decided"));
        }
        self.status = if approve {
            LeaveStatus::Approved
        } else {
            LeaveStatus::Rejected
        };
        Ok(())
    }
}

impl Entity for LeaveRequest {
    type Id = LeaveRequestId;

    fn id(&self) -> LeaveRequestId {
        self.id
    }
}

impl EmployeeOwned for LeaveRequest {
    fn owner(&self) -> EmployeeId {
        self.employee_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: AttendanceId,
    pub employee_id: EmployeeId,
    pub work_date: NaiveDate,
    pub hours: f32,
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(employee_id: EmployeeId, work_date: NaiveDate, hours: f32) -> DomainResult<Self> {
        if !(0.0..=24.0).contains(&hours) {
            return Err(DomainError::validation("hours must be between 0 and 24"));
        }
        Ok(Self {
            id: AttendanceId::new(),
            employee_id,
            work_date,
            hours,
            created_at: Utc::now(),
        })
    }
}

impl Entity for AttendanceRecord {
    type Id = AttendanceId;

    fn id(&self) -> AttendanceId {
        self.id
    }
}

impl EmployeeOwned for AttendanceRecord {
    fn owner(&self) -> EmployeeId {
        self.employee_id
    }
}
