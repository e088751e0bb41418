//! Contract of the backend the session layer talks to.
//!
//! Implemented in-process by `hrms-infra` and over HTTP by `hrms-client`.
//! Every call except `authenticate`/`refresh_claim` presents the caller's
//! signed claim; the backend evaluates row policies against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrms_audit::{AuditAction, EntityType};
use hrms_core::{AccountId, EmployeeId};

use crate::{ClaimError, Privilege, SignedClaim};

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque single-use token exchanged for a replacement claim.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("RefreshToken(<redacted>)")
    }
}

/// Result of a credential or refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSession {
    pub access: SignedClaim,
    pub refresh_token: RefreshToken,
}

/// A row of the authorization record store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub account_id: AccountId,
    pub privilege: Privilege,
    pub linked_employee_id: Option<EmployeeId>,
}

/// The only mutations the authorization record supports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizationUpdate {
    Privilege { privilege: Privilege },
    Link { employee_id: EmployeeId },
    Unlink,
}

/// Minimal employee projection for pickers ("link account to ...").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: EmployeeId,
    pub full_name: String,
    pub position: String,
    pub department: String,
}

/// Client-originated audit entry. The backend attributes it to the claim
/// subject; there is no way to record on behalf of another account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub action: AuditAction,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("refresh token expired or invalid")]
    ExpiredRefresh,

    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The presented claim was rejected (expired, bad signature). The caller
    /// should perform a refresh exchange.
    #[error("claim rejected: {0}")]
    ClaimRejected(#[from] ClaimError),

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError>;

    /// Exchange a refresh token for a replacement claim. The replacement embeds
    /// the privilege currently held in the authorization record.
    async fn refresh_claim(&self, refresh_token: &RefreshToken) -> Result<IssuedSession, AuthError>;

    async fn read_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, BackendError>;

    async fn write_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
        update: AuthorizationUpdate,
    ) -> Result<(), BackendError>;

    async fn unlinked_employees(&self, access_token: &str) -> Result<Vec<EmployeeSummary>, BackendError>;

    /// Revoke the refresh token and record the sign-out.
    async fn sign_out(&self, access_token: &str, refresh_token: &RefreshToken) -> Result<(), BackendError>;

    async fn record_activity(&self, access_token: &str, activity: Activity) -> Result<(), BackendError>;
}

#[async_trait]
impl<B> AuthBackend for std::sync::Arc<B>
where
    B: AuthBackend + ?Sized,
{
    async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError> {
        (**self).authenticate(credentials).await
    }

    async fn refresh_claim(&self, refresh_token: &RefreshToken) -> Result<IssuedSession, AuthError> {
        (**self).refresh_claim(refresh_token).await
    }

    async fn read_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, BackendError> {
        (**self).read_authorization_record(access_token, account_id).await
    }

    async fn write_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
        update: AuthorizationUpdate,
    ) -> Result<(), BackendError> {
        (**self)
            .write_authorization_record(access_token, account_id, update)
            .await
    }

    async fn unlinked_employees(&self, access_token: &str) -> Result<Vec<EmployeeSummary>, BackendError> {
        (**self).unlinked_employees(access_token).await
    }

    async fn sign_out(&self, access_token: &str, refresh_token: &RefreshToken) -> Result<(), BackendError> {
        (**self).sign_out(access_token, refresh_token).await
    }

    async fn record_activity(&self, access_token: &str, activity: Activity) -> Result<(), BackendError> {
        (**self).record_activity(access_token, activity).await
    }
}
