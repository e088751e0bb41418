//! Session context and claims synchronizer.
//!
//! Pages hold a [`SessionContext`] and ask it for the current privilege.
//! The context reconciles the signed claim with the authorization record:
//!
//! - fast path: the claim embeds a privilege; adopt it and read only the link
//! - slow path: read privilege and link from the record, then request a
//!   replacement claim in the background so later sign-ins take the fast path
//! - any failure to read the record degrades to the least privilege
//!
//! State sits behind a `std::sync::RwLock` that is never held across an
//! `.await`.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hrms_audit::{AuditAction, EntityType};
use hrms_auth::{
    Activity, AuthBackend, AuthError, AuthorizationRecord, AuthorizationUpdate, BackendError,
    ClaimError, Credentials, EmployeeSummary, IssuedSession, Privilege, RefreshToken,
};
use hrms_core::{AccountId, EmployeeId};

use crate::session::{Phase, Session, SessionError, SessionState};

pub struct SessionContext<B> {
    backend: Arc<B>,
    state: Arc<RwLock<SessionState>>,
    reissue: Mutex<Option<JoinHandle<()>>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl<B> SessionContext<B>
where
    B: AuthBackend + 'static,
{
    pub fn new(backend: B) -> Self {
        Self::with_shared(Arc::new(backend))
    }

    pub fn with_shared(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(RwLock::new(SessionState::default())),
            reissue: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn phase(&self) -> Phase {
        self.read().phase
    }

    /// Snapshot of the current session, if signed in.
    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.read().session.as_ref().map(Session::account_id)
    }

    /// Never blocks on I/O. Least privilege when signed out; the last known
    /// privilege while a refresh is in flight.
    pub fn current_privilege(&self) -> Privilege {
        self.read()
            .session
            .as_ref()
            .map(|s| s.privilege)
            .unwrap_or(Privilege::LEAST)
    }

    /// Page guard. Always false without a reconciled session.
    pub fn require_at_least(&self, level: Privilege) -> bool {
        self.read()
            .session
            .as_ref()
            .is_some_and(|s| s.privilege.at_least(level))
    }

    pub fn linked_employee(&self) -> Option<EmployeeId> {
        self.read().session.as_ref().and_then(|s| s.linked_employee_id)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let issued = self.backend.authenticate(credentials).await?;

        self.abort_reissue();
        let generation = {
            let mut state = self.write();
            state.generation += 1;
            state.session = None;
            state.phase = Phase::ClaimIssued;
            state.generation
        };

        info!(account_id = %issued.access.claim.sub, "claim issued");
        Ok(self.reconcile(generation, issued).await)
    }

    /// Re-reconcile through a refresh exchange after an external privilege
    /// change. The previous session keeps serving until the replacement
    /// lands.
    pub async fn invalidate(&self) -> Result<Session, SessionError> {
        self.refresh_session(None).await
    }

    /// Wait for a pending background replacement-claim request, if any.
    pub async fn reissue_settled(&self) {
        let handle = self
            .reissue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Record a sign-out and discard all local state. The backend call is
    /// not awaited and its failure cannot keep the session alive.
    pub fn sign_out(&self) {
        self.abort_reissue();
        let session = {
            let mut state = self.write();
            let session = state.session.take();
            state.generation += 1;
            session
        };

        if let Some(session) = session {
            match tokio::runtime::Handle::try_current() {
                Ok(rt) => {
                    let backend = self.backend.clone();
                    rt.spawn(async move {
                        if let Err(e) = backend
                            .sign_out(session.access_token(), &session.refresh_token)
                            .await
                        {
                            warn!(error = %e, "sign-out could not be recorded");
                        }
                    });
                }
                Err(_) => warn!("no runtime; sign-out not recorded"),
            }
        }

        self.write().clear();
    }

    /// Fire-and-forget audit entry attributed to the signed-in account.
    pub fn record_activity(
        &self,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<String>,
        detail: Option<Value>,
    ) {
        let Some(token) = self.access_token() else {
            debug!(?action, "no session; activity not recorded");
            return;
        };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(?action, "no runtime; activity not recorded");
            return;
        };

        let backend = self.backend.clone();
        let activity = Activity {
            action,
            entity_type,
            entity_id,
            detail,
        };
        rt.spawn(async move {
            if let Err(e) = backend.record_activity(&token, activity).await {
                warn!(error = %e, "activity could not be recorded");
            }
        });
    }

    pub async fn read_authorization_record(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, SessionError> {
        self.call(move |backend, token| async move {
            backend.read_authorization_record(&token, account_id).await
        })
        .await
    }

    pub async fn link(&self, account_id: AccountId, employee_id: EmployeeId) -> Result<(), SessionError> {
        self.call(move |backend, token| async move {
            backend
                .write_authorization_record(&token, account_id, AuthorizationUpdate::Link { employee_id })
                .await
        })
        .await
    }

    pub async fn unlink(&self, account_id: AccountId) -> Result<(), SessionError> {
        self.call(move |backend, token| async move {
            backend
                .write_authorization_record(&token, account_id, AuthorizationUpdate::Unlink)
                .await
        })
        .await
    }

    pub async fn unlinked_employees(&self) -> Result<Vec<EmployeeSummary>, SessionError> {
        self.call(|backend, token| async move { backend.unlinked_employees(&token).await })
            .await
    }

    /// Rejected locally when `account_id` is the signed-in account; the
    /// backend enforces its own rules regardless.
    pub async fn change_privilege(&self, account_id: AccountId, privilege: Privilege) -> Result<(), SessionError> {
        if self.account_id() == Some(account_id) {
            return Err(SessionError::SelfChangeRejected);
        }
        self.call(move |backend, token| async move {
            backend
                .write_authorization_record(&token, account_id, AuthorizationUpdate::Privilege { privilege })
                .await
        })
        .await
    }

    async fn reconcile(&self, generation: u64, issued: IssuedSession) -> Session {
        self.with_generation(generation, |state| state.phase = Phase::Reconciling);

        let claim = &issued.access.claim;
        let record = self
            .backend
            .read_authorization_record(&issued.access.token, claim.sub)
            .await;

        let (privilege, linked_employee_id, degraded, reissue) = match (claim.privilege, record) {
            // The claim is authoritative for privilege; only the link is taken.
            (Some(privilege), Ok(record)) => (privilege, record.and_then(|r| r.linked_employee_id), false, false),
            (Some(privilege), Err(e)) => {
                warn!(account_id = %claim.sub, error = %e, "link lookup failed; continuing unlinked");
                (privilege, None, false, false)
            }
            (None, Ok(Some(record))) => (record.privilege, record.linked_employee_id, false, true),
            (None, Ok(None)) => {
                warn!(account_id = %claim.sub, "no authorization record; degrading to least privilege");
                (Privilege::LEAST, None, true, false)
            }
            (None, Err(e)) => {
                warn!(account_id = %claim.sub, error = %e, "authorization record unreadable; degrading to least privilege");
                (Privilege::LEAST, None, true, false)
            }
        };

        let session = Session {
            generation,
            access: issued.access,
            refresh_token: issued.refresh_token,
            privilege,
            linked_employee_id,
            degraded,
        };

        let installed = self.with_generation(generation, |state| {
            state.phase = Phase::Ready { degraded };
            state.session = Some(session.clone());
        });

        if installed && reissue {
            self.spawn_reissue(&session);
        }
        session
    }

    /// Request a claim embedding the privilege just read, off the caller's
    /// path. The result only lands if the session is still the same one.
    fn spawn_reissue(&self, session: &Session) {
        let backend = self.backend.clone();
        let state = self.state.clone();
        let generation = session.generation;
        let refresh_token = session.refresh_token.clone();

        let handle = tokio::spawn(async move {
            match backend.refresh_claim(&refresh_token).await {
                Ok(replacement) => {
                    let mut state = state.write().unwrap_or_else(PoisonError::into_inner);
                    if state.generation != generation {
                        return;
                    }
                    if let Some(current) = state.session.as_mut() {
                        if let Some(privilege) = replacement.access.claim.privilege {
                            current.privilege = privilege;
                        }
                        current.access = replacement.access;
                        current.refresh_token = replacement.refresh_token;
                        debug!(account_id = %current.account_id(), "replacement claim installed");
                    }
                }
                Err(e) => warn!(error = %e, "replacement claim request failed"),
            }
        });

        if let Some(old) = self
            .reissue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            old.abort();
        }
    }

    /// Run `op` with the current access token; on an expired claim, refresh
    /// once and retry.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, SessionError>
    where
        F: Fn(Arc<B>, String) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let session = self.session().ok_or(SessionError::NotSignedIn)?;
        match op(self.backend.clone(), session.access_token().to_string()).await {
            Err(BackendError::ClaimRejected(ClaimError::Expired)) => {
                debug!("claim expired; refreshing");
                let current = self.refresh_session(Some(&session.refresh_token)).await?;
                Ok(op(self.backend.clone(), current.access.token).await?)
            }
            other => Ok(other?),
        }
    }

    /// One refresh exchange at a time. A caller holding `stale` whose
    /// session was already replaced while it waited adopts the replacement.
    async fn refresh_session(&self, stale: Option<&RefreshToken>) -> Result<Session, SessionError> {
        let _exchange = self.refreshing.lock().await;
        self.reissue_settled().await;

        let (generation, previous) = {
            let mut state = self.write();
            let Some(previous) = state.session.clone() else {
                return Err(SessionError::NotSignedIn);
            };
            if stale.is_some_and(|t| t.as_str() != previous.refresh_token.as_str()) {
                return Ok(previous);
            }
            state.phase = Phase::ClaimIssued;
            (state.generation, previous)
        };

        match self.backend.refresh_claim(&previous.refresh_token).await {
            Ok(issued) => Ok(self.reconcile(generation, issued).await),
            Err(AuthError::ExpiredRefresh) => {
                warn!(account_id = %previous.account_id(), "refresh rejected; session discarded");
                self.clear_if(generation);
                Err(SessionError::ReauthenticationRequired)
            }
            Err(e) => {
                warn!(error = %e, "refresh exchange failed; keeping previous session");
                self.with_generation(generation, |state| {
                    state.phase = Phase::Ready {
                        degraded: previous.degraded,
                    };
                });
                Err(e.into())
            }
        }
    }

    fn access_token(&self) -> Option<String> {
        self.read()
            .session
            .as_ref()
            .map(|s| s.access_token().to_string())
    }

    fn abort_reissue(&self) {
        if let Some(handle) = self
            .reissue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn clear_if(&self, generation: u64) {
        self.with_generation(generation, SessionState::clear);
    }

    /// Apply `f` only if no sign-in/sign-out happened since `generation`.
    fn with_generation<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.write();
        if state.generation != generation {
            return false;
        }
        f(&mut state);
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B> core::fmt::Debug for SessionContext<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SessionContext")
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
