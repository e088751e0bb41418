//! Session context against a scripted backend and against the in-process
//! services.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use hrms_auth::{
    Activity, AuthBackend, AuthError, AuthorizationRecord, AuthorizationUpdate, BackendError, ClaimError,
    ClaimSigner, Credentials, EmployeeSummary, IssuedSession, Privilege, RefreshToken,
};
use hrms_core::{AccountId, EmployeeId};

use crate::context::SessionContext;
use crate::session::{Phase, SessionError};

struct Scripted {
    signer: ClaimSigner,
    account_id: AccountId,
    /// Privilege embedded by `authenticate`.
    sign_in_privilege: Mutex<Option<Privilege>>,
    record: Mutex<Result<Option<AuthorizationRecord>, BackendError>>,
    refresh_error: Mutex<Option<AuthError>>,
    /// When set, `refresh_claim` waits for a notification before answering.
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    expiring_calls: AtomicUsize,
    sign_out_fails: AtomicBool,
    refreshes: AtomicUsize,
    writes: AtomicUsize,
    sign_outs: AtomicUsize,
    activities: Mutex<Vec<Activity>>,
}

impl Scripted {
    fn new(sign_in_privilege: Option<Privilege>, record: Option<Privilege>) -> Self {
        let account_id = AccountId::new();
        Self {
            signer: ClaimSigner::hs256(b"client-tests", Duration::minutes(15)),
            account_id,
            sign_in_privilege: Mutex::new(sign_in_privilege),
            record: Mutex::new(Ok(record.map(|privilege| AuthorizationRecord {
                account_id,
                privilege,
                linked_employee_id: None,
            }))),
            refresh_error: Mutex::new(None),
            refresh_gate: Mutex::new(None),
            expiring_calls: AtomicUsize::new(0),
            sign_out_fails: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
            activities: Mutex::new(Vec::new()),
        }
    }

    fn set_record(&self, record: Result<Option<AuthorizationRecord>, BackendError>) {
        *self.record.lock().unwrap() = record;
    }

    fn promote(&self, privilege: Privilege) {
        let mut record = self.record.lock().unwrap();
        if let Ok(Some(r)) = record.as_mut() {
            r.privilege = privilege;
        }
    }

    fn issue(&self, privilege: Option<Privilege>) -> IssuedSession {
        IssuedSession {
            access: self
                .signer
                .issue(self.account_id, "pat@example.com", privilege, Utc::now())
                .unwrap(),
            refresh_token: RefreshToken::new(EmployeeId::new().to_string()),
        }
    }

    fn take_expiry(&self) -> Result<(), BackendError> {
        let expired = self
            .expiring_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if expired {
            return Err(BackendError::ClaimRejected(ClaimError::Expired));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for Scripted {
    async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError> {
        if credentials.password != "correct-horse" {
            return Err(AuthError::InvalidCredentials);
        }
        let privilege = *self.sign_in_privilege.lock().unwrap();
        Ok(self.issue(privilege))
    }

    async fn refresh_claim(&self, _refresh_token: &RefreshToken) -> Result<IssuedSession, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let gate = self.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(e) = self.refresh_error.lock().unwrap().clone() {
            return Err(e);
        }
        let privilege = match &*self.record.lock().unwrap() {
            Ok(Some(r)) => r.privilege,
            _ => return Err(AuthError::Unavailable("record store down".into())),
        };
        Ok(self.issue(Some(privilege)))
    }

    async fn read_authorization_record(
        &self,
        _access_token: &str,
        _account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, BackendError> {
        self.take_expiry()?;
        self.record.lock().unwrap().clone()
    }

    async fn write_authorization_record(
        &self,
        _access_token: &str,
        _account_id: AccountId,
        _update: AuthorizationUpdate,
    ) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.take_expiry()
    }

    async fn unlinked_employees(&self, _access_token: &str) -> Result<Vec<EmployeeSummary>, BackendError> {
        self.take_expiry()?;
        Ok(Vec::new())
    }

    async fn sign_out(&self, _access_token: &str, _refresh_token: &RefreshToken) -> Result<(), BackendError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("audit store down".into()));
        }
        Ok(())
    }

    async fn record_activity(&self, _access_token: &str, activity: Activity) -> Result<(), BackendError> {
        self.activities.lock().unwrap().push(activity);
        Ok(())
    }
}

fn creds() -> Credentials {
    Credentials::new("pat@example.com", "correct-horse")
}

fn context(backend: Scripted) -> (SessionContext<Scripted>, Arc<Scripted>) {
    let backend = Arc::new(backend);
    (SessionContext::with_shared(backend.clone()), backend)
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn signed_out_context_reports_least_privilege() {
    let (ctx, _) = context(Scripted::new(None, Some(Privilege::Admin)));
    assert_eq!(ctx.phase(), Phase::Unauthenticated);
    assert_eq!(ctx.current_privilege(), Privilege::Employee);
    assert!(!ctx.require_at_least(Privilege::Employee));
}

#[tokio::test]
async fn bad_credentials_leave_context_unauthenticated() {
    let (ctx, _) = context(Scripted::new(None, Some(Privilege::Hr)));
    let err = ctx
        .sign_in(&Credentials::new("pat@example.com", "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Auth(AuthError::InvalidCredentials));
    assert_eq!(ctx.phase(), Phase::Unauthenticated);
}

#[tokio::test]
async fn claim_without_privilege_reads_record_and_requests_replacement() {
    let (ctx, backend) = context(Scripted::new(None, Some(Privilege::Hr)));

    let session = ctx.sign_in(&creds()).await.unwrap();
    assert_eq!(session.privilege, Privilege::Hr);
    assert!(!session.degraded);
    assert_eq!(session.claim_privilege(), None);
    assert_eq!(ctx.phase(), Phase::Ready { degraded: false });

    ctx.reissue_settled().await;
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
    let session = ctx.session().unwrap();
    assert_eq!(session.claim_privilege(), Some(Privilege::Hr));
    assert_eq!(session.privilege, Privilege::Hr);
}

#[tokio::test]
async fn embedded_privilege_is_adopted_without_replacement() {
    let employee = EmployeeId::new();
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Admin), None));
    backend.set_record(Ok(Some(AuthorizationRecord {
        account_id: backend.account_id,
        privilege: Privilege::Admin,
        linked_employee_id: Some(employee),
    })));

    let session = ctx.sign_in(&creds()).await.unwrap();
    ctx.reissue_settled().await;

    assert_eq!(session.privilege, Privilege::Admin);
    assert_eq!(ctx.linked_employee(), Some(employee));
    assert!(ctx.require_at_least(Privilege::Hr));
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedded_privilege_wins_over_record_privilege() {
    let employee = EmployeeId::new();
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), None));
    backend.set_record(Ok(Some(AuthorizationRecord {
        account_id: backend.account_id,
        privilege: Privilege::Admin,
        linked_employee_id: Some(employee),
    })));

    let session = ctx.sign_in(&creds()).await.unwrap();
    assert_eq!(session.privilege, Privilege::Hr);
    assert_eq!(session.linked_employee_id, Some(employee));
    assert!(!ctx.require_at_least(Privilege::Admin));
}

#[tokio::test]
async fn link_lookup_failure_keeps_embedded_privilege() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), Some(Privilege::Hr)));
    backend.set_record(Err(BackendError::Unavailable("timeout".into())));

    let session = ctx.sign_in(&creds()).await.unwrap();
    assert_eq!(session.privilege, Privilege::Hr);
    assert_eq!(session.linked_employee_id, None);
    assert!(!session.degraded);
}

#[tokio::test]
async fn missing_record_degrades_to_least_privilege() {
    let (ctx, backend) = context(Scripted::new(None, None));

    let session = ctx.sign_in(&creds()).await.unwrap();
    ctx.reissue_settled().await;

    assert_eq!(session.privilege, Privilege::Employee);
    assert!(session.degraded);
    assert_eq!(ctx.phase(), Phase::Ready { degraded: true });
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreadable_record_degrades_to_least_privilege() {
    let (ctx, backend) = context(Scripted::new(None, Some(Privilege::Admin)));
    backend.set_record(Err(BackendError::Unavailable("connection refused".into())));

    let session = ctx.sign_in(&creds()).await.unwrap();
    assert_eq!(session.privilege, Privilege::Employee);
    assert!(session.degraded);
    assert!(!ctx.require_at_least(Privilege::Hr));
}

#[tokio::test]
async fn invalidate_picks_up_external_promotion() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Employee), Some(Privilege::Employee)));
    ctx.sign_in(&creds()).await.unwrap();
    assert_eq!(ctx.current_privilege(), Privilege::Employee);

    backend.promote(Privilege::Hr);
    // Cached claim still says employee until invalidated.
    assert_eq!(ctx.current_privilege(), Privilege::Employee);

    let session = ctx.invalidate().await.unwrap();
    assert_eq!(session.privilege, Privilege::Hr);
    assert_eq!(session.claim_privilege(), Some(Privilege::Hr));
    assert_eq!(ctx.current_privilege(), Privilege::Hr);
}

#[tokio::test]
async fn expired_refresh_forces_reauthentication() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), Some(Privilege::Hr)));
    ctx.sign_in(&creds()).await.unwrap();
    *backend.refresh_error.lock().unwrap() = Some(AuthError::ExpiredRefresh);

    let err = ctx.invalidate().await.unwrap_err();
    assert_eq!(err, SessionError::ReauthenticationRequired);
    assert_eq!(ctx.phase(), Phase::Unauthenticated);
    assert!(ctx.session().is_none());
    assert_eq!(ctx.current_privilege(), Privilege::Employee);
}

#[tokio::test]
async fn unavailable_refresh_keeps_previous_session() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), Some(Privilege::Hr)));
    ctx.sign_in(&creds()).await.unwrap();
    *backend.refresh_error.lock().unwrap() = Some(AuthError::Unavailable("down".into()));

    let err = ctx.invalidate().await.unwrap_err();
    assert!(matches!(err, SessionError::Auth(AuthError::Unavailable(_))));
    assert_eq!(ctx.current_privilege(), Privilege::Hr);
    assert_eq!(ctx.phase(), Phase::Ready { degraded: false });
}

#[tokio::test]
async fn previous_session_serves_while_refresh_is_in_flight() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), Some(Privilege::Hr)));
    let ctx = Arc::new(ctx);
    ctx.sign_in(&creds()).await.unwrap();

    let gate = Arc::new(Notify::new());
    *backend.refresh_gate.lock().unwrap() = Some(gate.clone());

    let pending = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.invalidate().await }
    });
    eventually(|| backend.refreshes.load(Ordering::SeqCst) == 1).await;

    assert_eq!(ctx.phase(), Phase::ClaimIssued);
    assert_eq!(ctx.current_privilege(), Privilege::Hr);
    assert!(ctx.require_at_least(Privilege::Hr));
    assert!(ctx.session().is_some());
    ctx.unlinked_employees().await.unwrap();

    gate.notify_one();
    let session = pending.await.unwrap().unwrap();
    assert_eq!(session.privilege, Privilege::Hr);
    assert_eq!(ctx.phase(), Phase::Ready { degraded: false });
}

#[tokio::test]
async fn concurrent_expired_calls_share_one_refresh() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Admin), Some(Privilege::Admin)));
    ctx.sign_in(&creds()).await.unwrap();

    let gate = Arc::new(Notify::new());
    *backend.refresh_gate.lock().unwrap() = Some(gate.clone());
    backend.expiring_calls.store(2, Ordering::SeqCst);

    let (first, second, ()) = tokio::join!(
        ctx.link(AccountId::new(), EmployeeId::new()),
        ctx.unlink(AccountId::new()),
        async {
            eventually(|| backend.refreshes.load(Ordering::SeqCst) == 1).await;
            gate.notify_one();
        }
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(backend.writes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn invalidate_without_session_is_rejected() {
    let (ctx, _) = context(Scripted::new(None, None));
    assert_eq!(ctx.invalidate().await.unwrap_err(), SessionError::NotSignedIn);
}

#[tokio::test]
async fn sign_out_clears_state_even_when_backend_fails() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Admin), Some(Privilege::Admin)));
    backend.sign_out_fails.store(true, Ordering::SeqCst);
    ctx.sign_in(&creds()).await.unwrap();

    ctx.sign_out();

    assert_eq!(ctx.phase(), Phase::Unauthenticated);
    assert!(ctx.session().is_none());
    assert_eq!(ctx.current_privilege(), Privilege::Employee);
    eventually(|| backend.sign_outs.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn sign_out_discards_pending_replacement() {
    let (ctx, _) = context(Scripted::new(None, Some(Privilege::Hr)));
    ctx.sign_in(&creds()).await.unwrap();
    ctx.sign_out();
    ctx.reissue_settled().await;
    assert!(ctx.session().is_none());
}

#[tokio::test]
async fn own_privilege_change_is_rejected_before_backend() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Admin), Some(Privilege::Admin)));
    ctx.sign_in(&creds()).await.unwrap();

    let err = ctx
        .change_privilege(backend.account_id, Privilege::Employee)
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::SelfChangeRejected);
    assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_claim_is_refreshed_and_call_retried_once() {
    let (ctx, backend) = context(Scripted::new(Some(Privilege::Admin), Some(Privilege::Admin)));
    ctx.sign_in(&creds()).await.unwrap();
    backend.expiring_calls.store(1, Ordering::SeqCst);

    ctx.link(AccountId::new(), EmployeeId::new()).await.unwrap();

    assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn operations_require_a_session() {
    let (ctx, _) = context(Scripted::new(None, None));
    assert_eq!(
        ctx.unlink(AccountId::new()).await.unwrap_err(),
        SessionError::NotSignedIn
    );
    assert_eq!(ctx.unlinked_employees().await.unwrap_err(), SessionError::NotSignedIn);
}

#[tokio::test]
async fn activity_is_sent_without_blocking() {
    use hrms_audit::{AuditAction, EntityType};

    let (ctx, backend) = context(Scripted::new(Some(Privilege::Hr), Some(Privilege::Hr)));
    ctx.record_activity(AuditAction::Updated, EntityType::Employee, None, None);
    assert!(backend.activities.lock().unwrap().is_empty());

    ctx.sign_in(&creds()).await.unwrap();
    ctx.record_activity(
        AuditAction::Updated,
        EntityType::Employee,
        Some("e-1".to_string()),
        None,
    );
    eventually(|| backend.activities.lock().unwrap().len() == 1).await;
    assert_eq!(backend.activities.lock().unwrap()[0].action, AuditAction::Updated);
}

mod local {
    use super::*;

    use hrms_infra::directory::Directory;
    use hrms_infra::{AppConfig, LocalBackend, Services};

    const PASSWORD: &str = "correct-horse";

    async fn account(services: &Services, email: &str, privilege: Privilege) -> AccountId {
        let account = services.identity.register(email, PASSWORD).await.unwrap();
        if privilege != Privilege::LEAST {
            services.directory.set_privilege(account.id, privilege).await.unwrap();
        }
        account.id
    }

    #[tokio::test]
    async fn second_sign_in_takes_the_fast_path() {
        let services = Services::in_memory(&AppConfig::default());
        account(&services, "hr@example.com", Privilege::Hr).await;
        let ctx = SessionContext::new(LocalBackend::new(services));

        let first = ctx.sign_in(&Credentials::new("hr@example.com", PASSWORD)).await.unwrap();
        assert_eq!(first.claim_privilege(), None);
        assert_eq!(first.privilege, Privilege::Hr);

        ctx.reissue_settled().await;
        assert_eq!(ctx.session().unwrap().claim_privilege(), Some(Privilege::Hr));

        ctx.sign_out();
        let second = ctx.sign_in(&Credentials::new("hr@example.com", PASSWORD)).await.unwrap();
        assert_eq!(second.claim_privilege(), Some(Privilege::Hr));
        assert_eq!(second.privilege, Privilege::Hr);
    }

    #[tokio::test]
    async fn promotion_by_admin_is_seen_after_invalidate() {
        let services = Services::in_memory(&AppConfig::default());
        account(&services, "admin@example.com", Privilege::Admin).await;
        let staff = account(&services, "staff@example.com", Privilege::Employee).await;

        let backend = Arc::new(LocalBackend::new(services));
        let admin = SessionContext::with_shared(backend.clone());
        let user = SessionContext::with_shared(backend);

        admin
            .sign_in(&Credentials::new("admin@example.com", PASSWORD))
            .await
            .unwrap();
        admin.reissue_settled().await;
        user.sign_in(&Credentials::new("staff@example.com", PASSWORD))
            .await
            .unwrap();
        user.reissue_settled().await;
        assert_eq!(user.current_privilege(), Privilege::Employee);

        admin.change_privilege(staff, Privilege::Hr).await.unwrap();
        assert_eq!(user.current_privilege(), Privilege::Employee);

        user.invalidate().await.unwrap();
        assert_eq!(user.current_privilege(), Privilege::Hr);
    }

    #[tokio::test]
    async fn hr_cannot_promote_to_admin() {
        let services = Services::in_memory(&AppConfig::default());
        account(&services, "hr@example.com", Privilege::Hr).await;
        let target = account(&services, "e@example.com", Privilege::Employee).await;
        let ctx = SessionContext::new(LocalBackend::new(services));

        ctx.sign_in(&Credentials::new("hr@example.com", PASSWORD)).await.unwrap();
        ctx.reissue_settled().await;
        let err = ctx.change_privilege(target, Privilege::Admin).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(BackendError::Denied(_))));
    }
}
