//! Authorization record store: accounts (privilege + employee link) and the
//! employee records they link to.
//!
//! The account → employee link is injective. Implementations enforce this
//! themselves (single lock in memory, unique index in Postgres); callers never
//! filter "already linked" employees on their own.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrms_auth::{AuthorizationRecord, EmployeeSummary, Privilege};
use hrms_core::{AccountId, EmployeeId, Entity};

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub privilege: Privilege,
    pub linked_employee_id: Option<EmployeeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// New accounts start at the least privilege with no link.
    pub fn register(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            email: email.into(),
            privilege: Privilege::LEAST,
            linked_employee_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record(&self) -> AuthorizationRecord {
        AuthorizationRecord {
            account_id: self.id,
            privilege: self.privilege,
            linked_employee_id: self.linked_employee_id,
        }
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> AccountId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    #[default]
    Active,
    OnLeave,
    Terminated,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::OnLeave => "on_leave",
            EmployeeStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EmployeeStatus::Active),
            "on_leave" => Some(EmployeeStatus::OnLeave),
            "terminated" => Some(EmployeeStatus::Terminated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    pub position: String,
    pub department: String,
    pub status: EmployeeStatus,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn summary(&self) -> EmployeeSummary {
        EmployeeSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            position: self.position.clone(),
            department: self.department.clone(),
        }
    }
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> EmployeeId {
        self.id
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("employee {0} not found")]
    EmployeeNotFound(EmployeeId),

    /// Another account already holds the link to this employee.
    #[error("employee {0} is already linked to another account")]
    AlreadyLinked(EmployeeId),

    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Directory: Send + Sync + core::fmt::Debug {
    /// Create an account together with its password hash.
    async fn create_account(&self, account: Account, password_hash: String) -> Result<(), StoreError>;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Lookup by normalized email, returning the stored password hash.
    async fn credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError>;

    async fn set_password_hash(&self, id: AccountId, password_hash: String) -> Result<(), StoreError>;

    /// Single-row update; returns the account as it was before the change.
    async fn set_privilege(&self, id: AccountId, privilege: Privilege) -> Result<Account, StoreError>;

    /// Link `id` to `employee`. Linking to the employee it already holds is a
    /// no-op success; holding a different employee replaces that link.
    async fn link(&self, id: AccountId, employee: EmployeeId) -> Result<(), StoreError>;

    /// Remove the link; returns the employee that was unlinked, if any.
    async fn unlink(&self, id: AccountId) -> Result<Option<EmployeeId>, StoreError>;

    async fn create_employee(&self, employee: Employee) -> Result<(), StoreError>;

    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// All employees minus those currently targeted by a link, evaluated
    /// at query time by the store.
    async fn unlinked_employees(&self) -> Result<Vec<Employee>, StoreError>;
}

#[async_trait]
impl<D> Directory for std::sync::Arc<D>
where
    D: Directory + ?Sized,
{
    async fn create_account(&self, account: Account, password_hash: String) -> Result<(), StoreError> {
        (**self).create_account(account, password_hash).await
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).account(id).await
    }

    async fn credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        (**self).credentials(email).await
    }

    async fn set_password_hash(&self, id: AccountId, password_hash: String) -> Result<(), StoreError> {
        (**self).set_password_hash(id, password_hash).await
    }

    async fn set_privilege(&self, id: AccountId, privilege: Privilege) -> Result<Account, StoreError> {
        (**self).set_privilege(id, privilege).await
    }

    async fn link(&self, id: AccountId, employee: EmployeeId) -> Result<(), StoreError> {
        (**self).link(id, employee).await
    }

    async fn unlink(&self, id: AccountId) -> Result<Option<EmployeeId>, StoreError> {
        (**self).unlink(id).await
    }

    async fn create_employee(&self, employee: Employee) -> Result<(), StoreError> {
        (**self).create_employee(employee).await
    }

    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        (**self).employee(id).await
    }

    async fn unlinked_employees(&self) -> Result<Vec<Employee>, StoreError> {
        (**self).unlinked_employees().await
    }
}
