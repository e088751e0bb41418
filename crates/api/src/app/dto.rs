use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hrms_auth::{AuthorizationRecord, Privilege, RefreshToken};
use hrms_core::{AccountId, EmployeeId};
use hrms_infra::directory::Account;
use hrms_infra::gateway::Scope;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Body of `/auth/refresh` and `/auth/sign-out`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: RefreshToken,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PrivilegeRequest {
    pub privilege: Privilege,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub employee_id: EmployeeId,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub full_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaveRequest {
    pub employee_id: EmployeeId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DecideLeaveRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub employee_id: EmployeeId,
    pub work_date: NaiveDate,
    pub hours: f32,
}

/// `?employee_id=` narrows a listing to one employee; absent means all rows.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub employee_id: Option<EmployeeId>,
}

impl ScopeQuery {
    pub fn scope(&self) -> Scope {
        match self.employee_id {
            Some(id) => Scope::Employee(id),
            None => Scope::All,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: AccountId,
    pub email: String,
    pub privilege: Privilege,
    pub linked_employee_id: Option<EmployeeId>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            privilege: account.privilege,
            linked_employee_id: account.linked_employee_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub account_id: AccountId,
    pub email: String,
    /// What the presented claim says; may lag `record`.
    pub claim_privilege: Option<Privilege>,
    pub record: Option<AuthorizationRecord>,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub reset_token: String,
}
