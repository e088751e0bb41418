//! Policy-evaluated access to the protected HR tables.
//!
//! Every request names its scope explicitly. A scope the requester may not
//! read is denied as a whole rather than silently narrowed to an empty
//! result.

pub mod records;
pub mod table;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use hrms_audit::{AuditAction, AuditEntry, AuditRecorder, AuditStore, EntityType};
use hrms_auth::{Operation, RowFacts, SessionClaim, Table};
use hrms_core::{EmployeeId, LeaveRequestId};

use crate::directory::{Directory, Employee, EmployeeStatus};
use crate::error::ServiceError;
use crate::gate::PolicyGate;

pub use records::{AttendanceRecord, LeaveRequest, LeaveStatus};
pub use table::{EmployeeOwned, RecordTable};

const MAX_AUDIT_PAGE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "employee_id", rename_all = "snake_case")]
pub enum Scope {
    /// Every employee's rows (staff only).
    All,
    Employee(EmployeeId),
}

impl Scope {
    fn row_facts(&self) -> RowFacts {
        match self {
            Scope::All => RowFacts::default(),
            Scope::Employee(id) => RowFacts::employee(*id),
        }
    }

    fn owner(&self) -> Option<EmployeeId> {
        match self {
            Scope::All => None,
            Scope::Employee(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DataRequest {
    CreateEmployee {
        full_name: String,
        position: String,
        department: String,
    },
    GetEmployee {
        id: EmployeeId,
    },
    ListLeave {
        scope: Scope,
    },
    CreateLeave {
        employee_id: EmployeeId,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
        #[serde(default)]
        reason: String,
    },
    DecideLeave {
        id: LeaveRequestId,
        approve: bool,
    },
    DeleteLeave {
        id: LeaveRequestId,
    },
    ListAttendance {
        scope: Scope,
    },
    RecordAttendance {
        employee_id: EmployeeId,
        work_date: NaiveDate,
        hours: f32,
    },
    RecentAudit {
        limit: usize,
    },
    /// Client-originated audit entry; the actor is always the claim subject.
    RecordActivity {
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<String>,
        #[serde(default)]
        detail: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DataResponse {
    Employee(Employee),
    LeaveRequest(LeaveRequest),
    LeaveRequests(Vec<LeaveRequest>),
    Attendance(AttendanceRecord),
    AttendanceRecords(Vec<AttendanceRecord>),
    AuditEntries(Vec<AuditEntry>),
    Done,
}

#[derive(Clone)]
pub struct DataGateway {
    gate: PolicyGate,
    directory: Arc<dyn Directory>,
    leave: Arc<RecordTable<LeaveRequest>>,
    attendance: Arc<RecordTable<AttendanceRecord>>,
    audit_store: Arc<dyn AuditStore>,
    audit: AuditRecorder,
}

impl DataGateway {
    pub fn new(
        gate: PolicyGate,
        directory: Arc<dyn Directory>,
        audit_store: Arc<dyn AuditStore>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            gate,
            directory,
            leave: Arc::new(RecordTable::new()),
            attendance: Arc::new(RecordTable::new()),
            audit_store,
            audit,
        }
    }

    /// Verify the claim, evaluate the matching row policy, then execute.
    #[instrument(skip(self, access_token, request), fields(op = request.name()), err)]
    pub async fn evaluate_and_execute(
        &self,
        access_token: &str,
        request: DataRequest,
    ) -> Result<DataResponse, ServiceError> {
        let claim = self.gate.verify(access_token)?;

        match request {
            DataRequest::CreateEmployee {
                full_name,
                position,
                department,
            } => {
                self.gate
                    .check(&claim, Table::Employees, Operation::Insert, RowFacts::default())
                    .await?;
                if full_name.trim().is_empty() {
                    return Err(ServiceError::Validation("full_name is required".into()));
                }
                let employee = Employee {
                    id: EmployeeId::new(),
                    full_name: full_name.trim().to_string(),
                    position,
                    department,
                    status: EmployeeStatus::Active,
                    created_at: Utc::now(),
                };
                self.directory.create_employee(employee.clone()).await?;
                self.record(&claim, AuditAction::Created, EntityType::Employee, employee.id.to_string());
                Ok(DataResponse::Employee(employee))
            }

            DataRequest::GetEmployee { id } => {
                self.gate
                    .check(&claim, Table::Employees, Operation::Select, RowFacts::employee(id))
                    .await?;
                let employee = self
                    .directory
                    .employee(id)
                    .await?
                    .ok_or(ServiceError::EmployeeNotFound(id))?;
                Ok(DataResponse::Employee(employee))
            }

            DataRequest::ListLeave { scope } => {
                self.gate
                    .check(&claim, Table::LeaveRequests, Operation::Select, scope.row_facts())
                    .await?;
                let mut rows = self.leave.list(scope.owner())?;
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(DataResponse::LeaveRequests(rows))
            }

            DataRequest::CreateLeave {
                employee_id,
                starts_on,
                ends_on,
                reason,
            } => {
                self.gate
                    .check(&claim, Table::LeaveRequests, Operation::Insert, RowFacts::employee(employee_id))
                    .await?;
                self.ensure_employee(employee_id).await?;
                let leave = LeaveRequest::new(employee_id, starts_on, ends_on, reason)?;
                self.leave.insert(leave.clone())?;
                self.record(&claim, AuditAction::Created, EntityType::LeaveRequest, leave.id.to_string());
                Ok(DataResponse::LeaveRequest(leave))
            }

            DataRequest::DecideLeave { id, approve } => {
                let existing = self
                    .leave
                    .get(id)?
                    .ok_or_else(|| ServiceError::NotFound(format!("leave request {id}")))?;
                self.gate
                    .check(
                        &claim,
                        Table::LeaveRequests,
                        Operation::Update,
                        RowFacts::employee(existing.employee_id),
                    )
                    .await?;

                let mut outcome = Ok(());
                let updated = self
                    .leave
                    .update(id, |leave| outcome = leave.decide(approve))?
                    .ok_or_else(|| ServiceError::NotFound(format!("leave request {id}")))?;
                outcome?;

                self.audit.submit(
                    AuditEntry::new(claim.sub, AuditAction::Updated, EntityType::LeaveRequest)
                        .with_entity_id(id)
                        .with_detail(json!({ "status": updated.status })),
                );
                Ok(DataResponse::LeaveRequest(updated))
            }

            DataRequest::DeleteLeave { id } => {
                let existing = self
                    .leave
                    .get(id)?
                    .ok_or_else(|| ServiceError::NotFound(format!("leave request {id}")))?;
                self.gate
                    .check(
                        &claim,
                        Table::LeaveRequests,
                        Operation::Delete,
                        RowFacts::employee(existing.employee_id),
                    )
                    .await?;
                if self.leave.remove(id)?.is_some() {
                    self.record(&claim, AuditAction::Deleted, EntityType::LeaveRequest, id.to_string());
                }
                Ok(DataResponse::Done)
            }

            DataRequest::ListAttendance { scope } => {
                self.gate
                    .check(&claim, Table::Attendance, Operation::Select, scope.row_facts())
                    .await?;
                let mut rows = self.attendance.list(scope.owner())?;
                rows.sort_by(|a, b| b.work_date.cmp(&a.work_date));
                Ok(DataResponse::AttendanceRecords(rows))
            }

            DataRequest::RecordAttendance {
                employee_id,
                work_date,
                hours,
            } => {
                self.gate
                    .check(&claim, Table::Attendance, Operation::Insert, RowFacts::employee(employee_id))
                    .await?;
                self.ensure_employee(employee_id).await?;
                let record = AttendanceRecord::new(employee_id, work_date, hours)?;
                self.attendance.insert(record.clone())?;
                self.record(&claim, AuditAction::Created, EntityType::Attendance, record.id.to_string());
                Ok(DataResponse::Attendance(record))
            }

            DataRequest::RecentAudit { limit } => {
                self.gate
                    .check(&claim, Table::AuditLog, Operation::Select, RowFacts::default())
                    .await?;
                let entries = self
                    .audit_store
                    .recent(limit.clamp(1, MAX_AUDIT_PAGE))
                    .await
                    .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
                Ok(DataResponse::AuditEntries(entries))
            }

            DataRequest::RecordActivity {
                action,
                entity_type,
                entity_id,
                detail,
            } => {
                self.gate
                    .check(&claim, Table::AuditLog, Operation::Insert, RowFacts::account(claim.sub))
                    .await?;
                self.audit.record(claim.sub, action, entity_type, entity_id, detail);
                Ok(DataResponse::Done)
            }
        }
    }

    async fn ensure_employee(&self, id: EmployeeId) -> Result<(), ServiceError> {
        match self.directory.employee(id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::EmployeeNotFound(id)),
        }
    }

    fn record(&self, claim: &SessionClaim, action: AuditAction, entity_type: EntityType, entity_id: String) {
        self.audit
            .record(claim.sub, action, entity_type, Some(entity_id), None);
    }
}

impl DataRequest {
    pub fn name(&self) -> &'static str {
        match self {
            DataRequest::CreateEmployee { .. } => "create_employee",
            DataRequest::GetEmployee { .. } => "get_employee",
            DataRequest::ListLeave { .. } => "list_leave",
            DataRequest::CreateLeave { .. } => "create_leave",
            DataRequest::DecideLeave { .. } => "decide_leave",
            DataRequest::DeleteLeave { .. } => "delete_leave",
            DataRequest::ListAttendance { .. } => "list_attendance",
            DataRequest::RecordAttendance { .. } => "record_attendance",
            DataRequest::RecentAudit { .. } => "recent_audit",
            DataRequest::RecordActivity { .. } => "record_activity",
        }
    }
}

impl core::fmt::Debug for DataGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataGateway").field("gate", &self.gate).finish_non_exhaustive()
    }
}
