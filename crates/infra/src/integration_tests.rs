//! End-to-end tests over the in-memory wiring.
//!
//! Covers: claim issuance → policy gate → directory/record tables → audit.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use hrms_audit::{
    AuditAction, AuditConfig, AuditEntry, AuditStore, AuditStoreError, EntityType, InMemoryAuditStore,
};
use hrms_auth::{ClaimError, Credentials, PolicyError, Privilege};
use hrms_core::{AccountId, EmployeeId};

use crate::config::AppConfig;
use crate::directory::{Directory, InMemoryDirectory};
use crate::error::ServiceError;
use crate::gateway::{DataRequest, DataResponse, Scope};
use crate::services::Services;

const PASSWORD: &str = "correct-horse";

fn config() -> AppConfig {
    AppConfig {
        audit: AuditConfig {
            capacity: 64,
            max_retries: 1,
            retry_backoff: StdDuration::from_millis(1),
        },
        ..AppConfig::default()
    }
}

struct World {
    services: Services,
    directory: Arc<InMemoryDirectory>,
    audit_store: Arc<InMemoryAuditStore>,
}

fn world() -> World {
    let directory = Arc::new(InMemoryDirectory::new());
    let audit_store = Arc::new(InMemoryAuditStore::new());
    let services = Services::assemble(&config(), directory.clone(), audit_store.clone());
    World {
        services,
        directory,
        audit_store,
    }
}

impl World {
    async fn account(&self, email: &str, privilege: Privilege) -> AccountId {
        let account = self.services.identity.register(email, PASSWORD).await.unwrap();
        if privilege != Privilege::LEAST {
            self.directory.set_privilege(account.id, privilege).await.unwrap();
        }
        account.id
    }

    /// Sign in and exchange once, so the claim embeds the current privilege.
    async fn token(&self, email: &str) -> String {
        let session = self
            .services
            .identity
            .authenticate(&Credentials::new(email, PASSWORD))
            .await
            .unwrap();
        let refreshed = self.services.identity.refresh(&session.refresh_token).await.unwrap();
        refreshed.access.token
    }

    async fn employee(&self, admin_token: &str, name: &str) -> EmployeeId {
        let response = self
            .services
            .gateway
            .evaluate_and_execute(
                admin_token,
                DataRequest::CreateEmployee {
                    full_name: name.to_string(),
                    position: "Analyst".to_string(),
                    department: "Finance".to_string(),
                },
            )
            .await
            .unwrap();
        match response {
            DataResponse::Employee(e) => e.id,
            other => panic!("unexpected response {other:?}"),
        }
    }

    async fn audit_actions(&self) -> Vec<AuditAction> {
        self.services.audit.flush().await;
        self.audit_store.all().into_iter().map(|e| e.action).collect()
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn leave(employee_id: EmployeeId) -> DataRequest {
    DataRequest::CreateLeave {
        employee_id,
        starts_on: day(4),
        ends_on: day(8),
        reason: "holiday".to_string(),
    }
}

fn assert_denied<T: core::fmt::Debug>(result: Result<T, ServiceError>) {
    assert!(
        matches!(result, Err(ServiceError::Denied(PolicyError::Denied { .. }))),
        "expected denial, got {result:?}"
    );
}

#[tokio::test]
async fn link_then_read_own_leave_but_not_a_colleagues() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let alice = w.account("alice@example.com", Privilege::Employee).await;
    // Alice's session predates the link.
    let alice_token = w.token("alice@example.com").await;

    let alice_emp = w.employee(&admin, "Alice").await;
    let bob_emp = w.employee(&admin, "Bob").await;
    w.services.linkage.link(&admin, alice, alice_emp).await.unwrap();

    let gw = &w.services.gateway;
    gw.evaluate_and_execute(&admin, leave(bob_emp)).await.unwrap();
    gw.evaluate_and_execute(&alice_token, leave(alice_emp)).await.unwrap();

    let own = gw
        .evaluate_and_execute(&alice_token, DataRequest::ListLeave { scope: Scope::Employee(alice_emp) })
        .await
        .unwrap();
    match own {
        DataResponse::LeaveRequests(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].employee_id, alice_emp);
        }
        other => panic!("unexpected response {other:?}"),
    }

    assert_denied(
        gw.evaluate_and_execute(&alice_token, DataRequest::ListLeave { scope: Scope::Employee(bob_emp) })
            .await,
    );
    assert_denied(
        gw.evaluate_and_execute(&alice_token, DataRequest::ListLeave { scope: Scope::All })
            .await,
    );
    assert_denied(gw.evaluate_and_execute(&alice_token, leave(bob_emp)).await);
}

#[tokio::test]
async fn unlinked_account_owns_no_rows() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    w.account("carol@example.com", Privilege::Employee).await;
    let carol = w.token("carol@example.com").await;
    let emp = w.employee(&admin, "Carol").await;

    assert_denied(w.services.gateway.evaluate_and_execute(&carol, leave(emp)).await);
    assert_denied(
        w.services
            .gateway
            .evaluate_and_execute(&carol, DataRequest::GetEmployee { id: emp })
            .await,
    );
}

#[tokio::test]
async fn stale_claim_is_promoted_by_refresh() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let dave = w.account("dave@example.com", Privilege::Employee).await;

    let session = w
        .services
        .identity
        .authenticate(&Credentials::new("dave@example.com", PASSWORD))
        .await
        .unwrap();
    let stale = w.services.identity.refresh(&session.refresh_token).await.unwrap();
    assert_eq!(stale.access.claim.privilege, Some(Privilege::Employee));

    w.services
        .privileges
        .change_privilege(&admin, dave, Privilege::Hr)
        .await
        .unwrap();

    // The old claim still evaluates as employee.
    assert_denied(
        w.services
            .gateway
            .evaluate_and_execute(&stale.access.token, DataRequest::ListLeave { scope: Scope::All })
            .await,
    );

    let promoted = w.services.identity.refresh(&stale.refresh_token).await.unwrap();
    assert_eq!(promoted.access.claim.privilege, Some(Privilege::Hr));
    w.services
        .gateway
        .evaluate_and_execute(&promoted.access.token, DataRequest::ListLeave { scope: Scope::All })
        .await
        .unwrap();

    assert!(w.audit_actions().await.contains(&AuditAction::PrivilegeChanged));
}

#[derive(Debug, Default)]
struct OutageStore {
    attempts: AtomicUsize,
}

#[async_trait]
impl AuditStore for OutageStore {
    async fn append(&self, _entry: AuditEntry) -> Result<(), AuditStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditStoreError::Unavailable("outage".into()))
    }

    async fn append_batch(&self, _entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditStoreError::Unavailable("outage".into()))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        Err(AuditStoreError::Unavailable("outage".into()))
    }
}

#[tokio::test]
async fn audit_outage_does_not_fail_the_link() {
    let directory = Arc::new(InMemoryDirectory::new());
    let outage = Arc::new(OutageStore::default());
    let services = Services::assemble(&config(), directory.clone(), outage.clone());

    let admin = services.identity.register("admin@example.com", PASSWORD).await.unwrap();
    directory.set_privilege(admin.id, Privilege::Admin).await.unwrap();
    let session = services
        .identity
        .authenticate(&Credentials::new("admin@example.com", PASSWORD))
        .await
        .unwrap();
    let admin_token = services
        .identity
        .refresh(&session.refresh_token)
        .await
        .unwrap()
        .access
        .token;

    let target = services.identity.register("erin@example.com", PASSWORD).await.unwrap();
    let emp = match services
        .gateway
        .evaluate_and_execute(
            &admin_token,
            DataRequest::CreateEmployee {
                full_name: "Erin".into(),
                position: "Clerk".into(),
                department: "Ops".into(),
            },
        )
        .await
        .unwrap()
    {
        DataResponse::Employee(e) => e.id,
        other => panic!("unexpected response {other:?}"),
    };

    services.linkage.link(&admin_token, target.id, emp).await.unwrap();
    services.audit.flush().await;

    let linked = directory.account(target.id).await.unwrap().unwrap().linked_employee_id;
    assert_eq!(linked, Some(emp));
    assert!(outage.attempts.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_links_through_the_service_admit_one() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = Arc::new(w.token("admin@example.com").await);
    let emp = w.employee(&admin, "Frank").await;

    let mut accounts = Vec::new();
    for i in 0..8 {
        accounts.push(w.account(&format!("f{i}@example.com"), Privilege::Employee).await);
    }

    let handles: Vec<_> = accounts
        .into_iter()
        .map(|account| {
            let linkage = w.services.linkage.clone();
            let admin = admin.clone();
            tokio::spawn(async move { linkage.link(&admin, account, emp).await })
        })
        .collect();

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => ok += 1,
            Err(ServiceError::AlreadyLinked(id)) => assert_eq!(id, emp),
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert!(w.services.linkage.unlinked_employees(&admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn unlink_is_idempotent_and_audited_once() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let gina = w.account("gina@example.com", Privilege::Employee).await;
    let emp = w.employee(&admin, "Gina").await;

    w.services.linkage.link(&admin, gina, emp).await.unwrap();
    w.services.linkage.unlink(&admin, gina).await.unwrap();
    w.services.linkage.unlink(&admin, gina).await.unwrap();

    let record = w
        .services
        .privileges
        .read_authorization_record(&admin, gina)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.linked_employee_id, None);

    let unlinked: Vec<_> = w.services.linkage.unlinked_employees(&admin).await.unwrap();
    assert_eq!(unlinked.len(), 1);

    let actions = w.audit_actions().await;
    let unlinks = actions.iter().filter(|a| **a == AuditAction::EmployeeUnlinked).count();
    assert_eq!(unlinks, 1);
}

#[tokio::test]
async fn employees_cannot_link_or_list_candidates() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let hank = w.account("hank@example.com", Privilege::Employee).await;
    let hank_token = w.token("hank@example.com").await;
    let emp = w.employee(&admin, "Hank").await;

    assert_denied(w.services.linkage.link(&hank_token, hank, emp).await);
    assert_denied(w.services.linkage.unlinked_employees(&hank_token).await);
}

#[tokio::test]
async fn privilege_changes_respect_authority() {
    let w = world();
    let admin_id = w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let hr_id = w.account("hr@example.com", Privilege::Hr).await;
    let hr = w.token("hr@example.com").await;
    let ivy = w.account("ivy@example.com", Privilege::Employee).await;

    assert_eq!(
        w.services.privileges.change_privilege(&admin, admin_id, Privilege::Hr).await,
        Err(ServiceError::SelfChangeRejected)
    );
    assert!(matches!(
        w.services.privileges.change_privilege(&hr, ivy, Privilege::Admin).await,
        Err(ServiceError::EscalationRejected { .. })
    ));
    assert!(matches!(
        w.services.privileges.change_privilege(&hr, admin_id, Privilege::Employee).await,
        Err(ServiceError::EscalationRejected { .. })
    ));

    let record = w
        .services
        .privileges
        .change_privilege(&hr, ivy, Privilege::Hr)
        .await
        .unwrap();
    assert_eq!(record.privilege, Privilege::Hr);

    w.services
        .privileges
        .change_privilege(&admin, hr_id, Privilege::Admin)
        .await
        .unwrap();
}

#[tokio::test]
async fn password_reset_is_staff_only_and_audited() {
    let w = world();
    let admin_id = w.account("admin@example.com", Privilege::Admin).await;
    w.account("hr@example.com", Privilege::Hr).await;
    let hr = w.token("hr@example.com").await;
    let jo = w.account("jo@example.com", Privilege::Employee).await;
    let jo_token = w.token("jo@example.com").await;

    assert_denied(w.services.privileges.issue_password_reset(&jo_token, jo).await);
    assert!(matches!(
        w.services.privileges.issue_password_reset(&hr, admin_id).await,
        Err(ServiceError::EscalationRejected { .. })
    ));

    let token = w.services.privileges.issue_password_reset(&hr, jo).await.unwrap();
    w.services.identity.reset_password(&token, "another-secret").await.unwrap();
    w.services
        .identity
        .authenticate(&Credentials::new("jo@example.com", "another-secret"))
        .await
        .unwrap();

    assert!(w.audit_actions().await.contains(&AuditAction::PasswordResetIssued));
}

#[tokio::test]
async fn expired_claim_is_rejected_before_any_store_access() {
    let w = world();
    let kim = w.account("kim@example.com", Privilege::Employee).await;
    let expired = w
        .services
        .identity
        .signer()
        .issue(kim, "kim@example.com", Some(Privilege::Employee), Utc::now() - Duration::hours(2))
        .unwrap();

    let err = w
        .services
        .privileges
        .read_authorization_record(&expired.token, kim)
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::Claim(ClaimError::Expired));
}

#[tokio::test]
async fn recorded_activity_is_attributed_to_the_claim_subject() {
    let w = world();
    let lee = w.account("lee@example.com", Privilege::Employee).await;
    let token = w.token("lee@example.com").await;

    w.services
        .gateway
        .evaluate_and_execute(
            &token,
            DataRequest::RecordActivity {
                action: AuditAction::Updated,
                entity_type: EntityType::Department,
                entity_id: Some("finance".into()),
                detail: None,
            },
        )
        .await
        .unwrap();
    w.services.audit.flush().await;

    let entry = w
        .audit_store
        .all()
        .into_iter()
        .find(|e| e.entity_type == EntityType::Department)
        .unwrap();
    assert_eq!(entry.actor_id, lee);

    assert_denied(
        w.services
            .gateway
            .evaluate_and_execute(&token, DataRequest::RecentAudit { limit: 10 })
            .await,
    );
}

#[tokio::test]
async fn leave_decisions_are_staff_only() {
    let w = world();
    w.account("admin@example.com", Privilege::Admin).await;
    let admin = w.token("admin@example.com").await;
    let max = w.account("max@example.com", Privilege::Employee).await;
    let max_token = w.token("max@example.com").await;
    let emp = w.employee(&admin, "Max").await;
    w.services.linkage.link(&admin, max, emp).await.unwrap();

    let id = match w.services.gateway.evaluate_and_execute(&max_token, leave(emp)).await.unwrap() {
        DataResponse::LeaveRequest(l) => l.id,
        other => panic!("unexpected response {other:?}"),
    };

    assert_denied(
        w.services
            .gateway
            .evaluate_and_execute(&max_token, DataRequest::DecideLeave { id, approve: true })
            .await,
    );
    w.services
        .gateway
        .evaluate_and_execute(&admin, DataRequest::DecideLeave { id, approve: true })
        .await
        .unwrap();

    // Owner may withdraw their own request.
    w.services
        .gateway
        .evaluate_and_execute(&max_token, DataRequest::DeleteLeave { id })
        .await
        .unwrap();
}
