//! Credential store and claim issuance.
//!
//! Sign-in embeds the account's privilege only once the account has been
//! *published*, i.e. after its first refresh exchange. Until then claims
//! carry no privilege and the client falls back to reading the
//! authorization record. Refresh always embeds the privilege currently
//! held by the store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hrms_audit::{AuditAction, AuditRecorder, EntityType};
use hrms_auth::{
    AuthError, ClaimError, ClaimSigner, Credentials, IssuedSession, RefreshToken, SessionClaim,
};
use hrms_core::{AccountId, validate_email};

use crate::directory::{Account, Directory};
use crate::error::ServiceError;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
struct Grant {
    account_id: AccountId,
    expires_at: DateTime<Utc>,
}

impl Grant {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct IdentityProvider {
    directory: Arc<dyn Directory>,
    signer: Arc<ClaimSigner>,
    audit: AuditRecorder,
    refresh_ttl: Duration,
    reset_ttl: Duration,
    refresh_tokens: Mutex<HashMap<String, Grant>>,
    reset_tokens: Mutex<HashMap<String, Grant>>,
    published: RwLock<HashSet<AccountId>>,
}

impl IdentityProvider {
    pub fn new(
        directory: Arc<dyn Directory>,
        signer: Arc<ClaimSigner>,
        audit: AuditRecorder,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            signer,
            audit,
            refresh_ttl,
            reset_ttl: Duration::hours(1),
            refresh_tokens: Mutex::new(HashMap::new()),
            reset_tokens: Mutex::new(HashMap::new()),
            published: RwLock::new(HashSet::new()),
        }
    }

    pub fn signer(&self) -> &ClaimSigner {
        &self.signer
    }

    /// Verify a presented access token against the current clock.
    pub fn verify(&self, token: &str) -> Result<SessionClaim, ClaimError> {
        self.signer.verify(token, Utc::now())
    }

    /// Create an `employee`-level account with no link.
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, ServiceError> {
        let email = validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = hash_password(password)?;
        let account = Account::register(email, Utc::now());
        self.directory.create_account(account.clone(), hash).await?;

        info!(account_id = %account.id, "account registered");
        self.audit.record(
            account.id,
            AuditAction::Created,
            EntityType::Account,
            Some(account.id.to_string()),
            None,
        );
        Ok(account)
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError> {
        let email = validate_email(&credentials.email).map_err(|_| AuthError::InvalidCredentials)?;
        let Some((account, hash)) = self.directory.credentials(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&credentials.password, &hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let privilege = self.is_published(account.id).then_some(account.privilege);
        let session = self.issue(&account, privilege)?;

        info!(account_id = %account.id, embedded_privilege = privilege.is_some(), "signed in");
        self.audit
            .record(account.id, AuditAction::SignIn, EntityType::Session, None, None);
        Ok(session)
    }

    /// Rotate a refresh token. The presented token is consumed only when a
    /// replacement is issued; a store outage leaves it usable.
    pub async fn refresh(&self, token: &RefreshToken) -> Result<IssuedSession, AuthError> {
        let grant = {
            let mut tokens = self
                .refresh_tokens
                .lock()
                .map_err(|_| AuthError::Unavailable("refresh registry poisoned".into()))?;
            match tokens.get(token.as_str()) {
                Some(g) if g.is_live(Utc::now()) => g.clone(),
                Some(_) => {
                    tokens.remove(token.as_str());
                    return Err(AuthError::ExpiredRefresh);
                }
                None => return Err(AuthError::ExpiredRefresh),
            }
        };

        let Some(account) = self.directory.account(grant.account_id).await? else {
            self.revoke(token);
            return Err(AuthError::ExpiredRefresh);
        };

        // A concurrent exchange of the same token may have won the race.
        let consumed = self
            .refresh_tokens
            .lock()
            .map_err(|_| AuthError::Unavailable("refresh registry poisoned".into()))?
            .remove(token.as_str());
        let Some(grant) = consumed else {
            return Err(AuthError::ExpiredRefresh);
        };

        match self.issue(&account, Some(account.privilege)) {
            Ok(session) => {
                self.publish(account.id);
                Ok(session)
            }
            Err(e) => {
                if let Ok(mut tokens) = self.refresh_tokens.lock() {
                    tokens.insert(token.as_str().to_string(), grant);
                }
                Err(e)
            }
        }
    }

    /// Drop a refresh token (sign-out). Unknown tokens are ignored.
    pub fn revoke(&self, token: &RefreshToken) {
        if let Ok(mut tokens) = self.refresh_tokens.lock() {
            tokens.remove(token.as_str());
        }
    }

    /// Revoke the refresh token and record the sign-out. Revocation happens
    /// even when the access token no longer verifies.
    pub fn sign_out(&self, access_token: &str, refresh_token: &RefreshToken) {
        self.revoke(refresh_token);
        match self.verify(access_token) {
            Ok(claim) => {
                info!(account_id = %claim.sub, "signed out");
                self.audit
                    .record(claim.sub, AuditAction::SignOut, EntityType::Session, None, None);
            }
            Err(e) => debug!(error = %e, "sign-out with unverifiable claim; not audited"),
        }
    }

    /// One-time password reset token for `account_id`. Callers authorize.
    pub fn issue_reset_token(&self, account_id: AccountId) -> Result<String, ServiceError> {
        let token = new_token();
        let now = Utc::now();
        let mut tokens = self
            .reset_tokens
            .lock()
            .map_err(|_| ServiceError::Unavailable("reset registry poisoned".into()))?;
        tokens.retain(|_, g| g.is_live(now));
        tokens.insert(
            token.clone(),
            Grant {
                account_id,
                expires_at: now + self.reset_ttl,
            },
        );
        Ok(token)
    }

    /// Consume a reset token and set a new password. Outstanding refresh
    /// tokens for the account are revoked.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let grant = self
            .reset_tokens
            .lock()
            .map_err(|_| ServiceError::Unavailable("reset registry poisoned".into()))?
            .remove(token);
        let grant = match grant {
            Some(g) if g.is_live(Utc::now()) => g,
            _ => return Err(ServiceError::Validation("reset token expired or invalid".into())),
        };

        let hash = hash_password(new_password)?;
        self.directory.set_password_hash(grant.account_id, hash).await?;

        if let Ok(mut tokens) = self.refresh_tokens.lock() {
            tokens.retain(|_, g| g.account_id != grant.account_id);
        }
        info!(account_id = %grant.account_id, "password reset");
        Ok(())
    }

    fn issue(
        &self,
        account: &Account,
        privilege: Option<hrms_auth::Privilege>,
    ) -> Result<IssuedSession, AuthError> {
        let now = Utc::now();
        let access = self
            .signer
            .issue(account.id, account.email.clone(), privilege, now)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let refresh = new_token();
        let mut tokens = self
            .refresh_tokens
            .lock()
            .map_err(|_| AuthError::Unavailable("refresh registry poisoned".into()))?;
        // Grants that were never presented again expire here.
        tokens.retain(|_, g| g.is_live(now));
        tokens.insert(
            refresh.clone(),
            Grant {
                account_id: account.id,
                expires_at: now + self.refresh_ttl,
            },
        );
        drop(tokens);

        Ok(IssuedSession {
            access,
            refresh_token: RefreshToken::new(refresh),
        })
    }

    #[cfg(test)]
    fn outstanding_grants(&self) -> (usize, usize) {
        let count = |m: &Mutex<HashMap<String, Grant>>| m.lock().map(|m| m.len()).unwrap_or(0);
        (count(&self.refresh_tokens), count(&self.reset_tokens))
    }

    fn is_published(&self, id: AccountId) -> bool {
        self.published.read().map(|p| p.contains(&id)).unwrap_or(false)
    }

    fn publish(&self, id: AccountId) {
        match self.published.write() {
            Ok(mut p) => {
                p.insert(id);
            }
            Err(_) => warn!(account_id = %id, "published set poisoned"),
        }
    }
}

impl core::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("signer", &self.signer)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::Unavailable(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is unparseable");
            false
        }
    }
}
