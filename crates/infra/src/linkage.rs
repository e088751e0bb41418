//! Account → employee linkage.
//!
//! Only staff may change a link (the `accounts` update rule). Injectivity is
//! enforced by the directory; this service never filters candidates itself.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use hrms_audit::{AuditAction, AuditRecorder, EntityType};
use hrms_auth::{EmployeeSummary, Operation, RowFacts, Table};
use hrms_core::{AccountId, EmployeeId};

use crate::directory::Directory;
use crate::error::ServiceError;
use crate::gate::PolicyGate;

#[derive(Debug, Clone)]
pub struct LinkageService {
    gate: PolicyGate,
    directory: Arc<dyn Directory>,
    audit: AuditRecorder,
}

impl LinkageService {
    pub fn new(gate: PolicyGate, directory: Arc<dyn Directory>, audit: AuditRecorder) -> Self {
        Self { gate, directory, audit }
    }

    #[instrument(skip(self, access_token), err)]
    pub async fn link(
        &self,
        access_token: &str,
        account_id: AccountId,
        employee_id: EmployeeId,
    ) -> Result<(), ServiceError> {
        let claim = self.gate.verify(access_token)?;
        self.gate
            .check(&claim, Table::Accounts, Operation::Update, RowFacts::account(account_id))
            .await?;

        self.directory.link(account_id, employee_id).await?;

        info!("employee linked");
        self.audit.record(
            claim.sub,
            AuditAction::EmployeeLinked,
            EntityType::Account,
            Some(account_id.to_string()),
            Some(json!({ "employee_id": employee_id })),
        );
        Ok(())
    }

    /// Idempotent: unlinking an unlinked account succeeds and records nothing.
    #[instrument(skip(self, access_token), err)]
    pub async fn unlink(&self, access_token: &str, account_id: AccountId) -> Result<(), ServiceError> {
        let claim = self.gate.verify(access_token)?;
        self.gate
            .check(&claim, Table::Accounts, Operation::Update, RowFacts::account(account_id))
            .await?;

        if let Some(employee_id) = self.directory.unlink(account_id).await? {
            info!(%employee_id, "employee unlinked");
            self.audit.record(
                claim.sub,
                AuditAction::EmployeeUnlinked,
                EntityType::Account,
                Some(account_id.to_string()),
                Some(json!({ "employee_id": employee_id })),
            );
        }
        Ok(())
    }

    /// Candidates for linking: employees no account currently targets.
    pub async fn unlinked_employees(&self, access_token: &str) -> Result<Vec<EmployeeSummary>, ServiceError> {
        let claim = self.gate.verify(access_token)?;
        self.gate
            .check(&claim, Table::Accounts, Operation::Update, RowFacts::default())
            .await?;

        let employees = self.directory.unlinked_employees().await?;
        Ok(employees.iter().map(|e| e.summary()).collect())
    }
}
