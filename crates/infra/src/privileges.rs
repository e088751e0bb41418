//! Reads and privilege changes on the authorization record, plus
//! staff-issued password resets.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use hrms_audit::{AuditAction, AuditRecorder, EntityType};
use hrms_auth::{AuthorizationRecord, Operation, Privilege, RowFacts, Table};
use hrms_core::AccountId;

use crate::directory::{Account, Directory};
use crate::error::ServiceError;
use crate::gate::PolicyGate;
use crate::identity::IdentityProvider;

#[derive(Debug, Clone)]
pub struct PrivilegeService {
    gate: PolicyGate,
    directory: Arc<dyn Directory>,
    identity: Arc<IdentityProvider>,
    audit: AuditRecorder,
}

impl PrivilegeService {
    pub fn new(
        gate: PolicyGate,
        directory: Arc<dyn Directory>,
        identity: Arc<IdentityProvider>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            gate,
            directory,
            identity,
            audit,
        }
    }

    /// `None` when the account has no record.
    pub async fn read_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let claim = self.gate.verify(access_token)?;
        self.gate
            .check(&claim, Table::Accounts, Operation::Select, RowFacts::account(account_id))
            .await?;

        Ok(self.directory.account(account_id).await?.map(|a| a.record()))
    }

    /// Set `account_id`'s privilege. Nobody changes their own privilege, and
    /// HR can neither grant nor revoke admin.
    #[instrument(skip(self, access_token), err)]
    pub async fn change_privilege(
        &self,
        access_token: &str,
        account_id: AccountId,
        privilege: Privilege,
    ) -> Result<AuthorizationRecord, ServiceError> {
        let claim = self.gate.verify(access_token)?;
        if claim.sub == account_id {
            return Err(ServiceError::SelfChangeRejected);
        }
        let ctx = self
            .gate
            .check(&claim, Table::Accounts, Operation::Update, RowFacts::account(account_id))
            .await?;

        let current = self.target(account_id).await?;
        if !ctx.privilege.may_reassign(current.privilege, privilege) {
            return Err(ServiceError::EscalationRejected {
                from: current.privilege.to_string(),
                to: privilege.to_string(),
            });
        }
        if current.privilege == privilege {
            return Ok(current.record());
        }

        let before = self.directory.set_privilege(account_id, privilege).await?;

        info!(from = %before.privilege, to = %privilege, "privilege changed");
        self.audit.record(
            claim.sub,
            AuditAction::PrivilegeChanged,
            EntityType::Account,
            Some(account_id.to_string()),
            Some(json!({ "from": before.privilege, "to": privilege })),
        );

        Ok(AuthorizationRecord {
            privilege,
            ..before.record()
        })
    }

    /// One-time reset token for another account. HR may not reset an admin.
    #[instrument(skip(self, access_token), err)]
    pub async fn issue_password_reset(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<String, ServiceError> {
        let claim = self.gate.verify(access_token)?;
        let ctx = self
            .gate
            .check(&claim, Table::Accounts, Operation::Update, RowFacts::account(account_id))
            .await?;

        let target = self.target(account_id).await?;
        if !ctx.privilege.may_reassign(target.privilege, target.privilege) {
            return Err(ServiceError::EscalationRejected {
                from: target.privilege.to_string(),
                to: target.privilege.to_string(),
            });
        }

        let token = self.identity.issue_reset_token(account_id)?;
        self.audit.record(
            claim.sub,
            AuditAction::PasswordResetIssued,
            EntityType::Account,
            Some(account_id.to_string()),
            None,
        );
        Ok(token)
    }

    async fn target(&self, account_id: AccountId) -> Result<Account, ServiceError> {
        self.directory
            .account(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound(account_id))
    }
}
