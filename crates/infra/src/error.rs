use thiserror::Error;

use hrms_auth::{AuthError, BackendError, ClaimError, PolicyError};
use hrms_core::{AccountId, DomainError, EmployeeId};

use crate::directory::StoreError;

/// Error returned by every service operation behind the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The presented claim could not be verified (expired, bad signature).
    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Denied(#[from] PolicyError),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("employee {0} not found")]
    EmployeeNotFound(EmployeeId),

    /// Another account already holds the link to this employee.
    #[error("employee {0} is already linked to another account")]
    AlreadyLinked(EmployeeId),

    #[error("an account may not change its own privilege")]
    SelfChangeRejected,

    #[error("privilege change from {from} to {to} exceeds the actor's authority")]
    EscalationRejected { from: String, to: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Claim(ClaimError::Expired) => "claim_expired",
            ServiceError::Claim(_) => "claim_invalid",
            ServiceError::Denied(_) => "denied",
            ServiceError::AccountNotFound(_)
            | ServiceError::EmployeeNotFound(_)
            | ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyLinked(_) => "already_linked",
            ServiceError::SelfChangeRejected => "self_change_rejected",
            ServiceError::EscalationRejected { .. } => "escalation_rejected",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::DuplicateEmail(_) => "duplicate_email",
            ServiceError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => ServiceError::AccountNotFound(id),
            StoreError::EmployeeNotFound(id) => ServiceError::EmployeeNotFound(id),
            StoreError::AlreadyLinked(id) => ServiceError::AlreadyLinked(id),
            StoreError::DuplicateEmail(email) => ServiceError::DuplicateEmail(email),
            StoreError::Unavailable(msg) => ServiceError::Unavailable(msg),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ServiceError> for BackendError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Claim(e) => BackendError::ClaimRejected(e),
            ServiceError::Denied(e) => BackendError::Denied(e.to_string()),
            e @ (ServiceError::AccountNotFound(_)
            | ServiceError::EmployeeNotFound(_)
            | ServiceError::NotFound(_)) => BackendError::NotFound(e.to_string()),
            e @ (ServiceError::AlreadyLinked(_) | ServiceError::DuplicateEmail(_)) => {
                BackendError::Conflict(e.to_string())
            }
            e @ (ServiceError::SelfChangeRejected | ServiceError::EscalationRejected { .. }) => {
                BackendError::Denied(e.to_string())
            }
            ServiceError::Validation(msg) => BackendError::Invalid(msg),
            ServiceError::Unavailable(msg) => BackendError::Unavailable(msg),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}
