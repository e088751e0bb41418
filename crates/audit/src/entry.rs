use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hrms_core::{AccountId, AuditEntryId};

/// Closed vocabulary of audited actions.
///
/// Tags are stable: dashboards and compliance exports key on them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SignIn,
    SignOut,
    PrivilegeChanged,
    EmployeeLinked,
    EmployeeUnlinked,
    PasswordResetIssued,
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SignIn => "sign_in",
            AuditAction::SignOut => "sign_out",
            AuditAction::PrivilegeChanged => "privilege_changed",
            AuditAction::EmployeeLinked => "employee_linked",
            AuditAction::EmployeeUnlinked => "employee_unlinked",
            AuditAction::PasswordResetIssued => "password_reset_issued",
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Account,
    Session,
    Employee,
    Department,
    LeaveRequest,
    Attendance,
    PerformanceReview,
    Payroll,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Account => "account",
            EntityType::Session => "session",
            EntityType::Employee => "employee",
            EntityType::Department => "department",
            EntityType::LeaveRequest => "leave_request",
            EntityType::Attendance => "attendance",
            EntityType::PerformanceReview => "performance_review",
            EntityType::Payroll => "payroll",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit trail. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: AccountId,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor_id: AccountId, action: AuditAction, entity_type: EntityType) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor_id,
            action,
            entity_type,
            entity_id: None,
            detail: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl ToString) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
