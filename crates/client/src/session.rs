//! Session state owned by a [`crate::SessionContext`].

use thiserror::Error;

use hrms_auth::{AuthError, BackendError, Privilege, RefreshToken, SignedClaim};
use hrms_core::{AccountId, EmployeeId};

/// Where a session is in its lifecycle.
///
/// ```text
/// Unauthenticated ─sign_in─► ClaimIssued ─► Reconciling ─► Ready { degraded }
///        ▲                        ▲                            │
///        └──── sign_out ──────────┴──────── invalidate ────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Unauthenticated,
    ClaimIssued,
    Reconciling,
    Ready { degraded: bool },
}

/// Everything the client knows about the signed-in account.
#[derive(Debug, Clone)]
pub struct Session {
    /// Changes on every sign-in; background work checks it before writing.
    pub(crate) generation: u64,
    pub(crate) access: SignedClaim,
    pub(crate) refresh_token: RefreshToken,
    pub privilege: Privilege,
    pub linked_employee_id: Option<EmployeeId>,
    /// Privilege could not be read and fell back to the least level.
    pub degraded: bool,
}

impl Session {
    pub fn account_id(&self) -> AccountId {
        self.access.claim.sub
    }

    pub fn email(&self) -> &str {
        &self.access.claim.email
    }

    pub fn access_token(&self) -> &str {
        &self.access.token
    }

    /// Privilege embedded in the presented claim, which can lag the session's.
    pub fn claim_privilege(&self) -> Option<Privilege> {
        self.access.claim.privilege
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub(crate) generation: u64,
    pub(crate) phase: Phase,
    pub(crate) session: Option<Session>,
}

impl SessionState {
    pub(crate) fn clear(&mut self) {
        self.phase = Phase::Unauthenticated;
        self.session = None;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("not signed in")]
    NotSignedIn,

    /// The refresh exchange failed; the session was discarded.
    #[error("session expired; sign in again")]
    ReauthenticationRequired,

    #[error("changing your own privilege is not allowed")]
    SelfChangeRejected,
}
