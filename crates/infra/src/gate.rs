//! Claim verification plus row policy evaluation for every store access.

use std::sync::Arc;

use tracing::debug;

use hrms_auth::{EvalContext, Operation, RowFacts, RuleSet, SessionClaim, Table};

use crate::directory::Directory;
use crate::error::ServiceError;
use crate::identity::IdentityProvider;

#[derive(Clone)]
pub struct PolicyGate {
    identity: Arc<IdentityProvider>,
    directory: Arc<dyn Directory>,
    rules: Arc<RuleSet>,
}

impl PolicyGate {
    pub fn new(identity: Arc<IdentityProvider>, directory: Arc<dyn Directory>, rules: Arc<RuleSet>) -> Self {
        Self {
            identity,
            directory,
            rules,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Reject expired or forged tokens before anything touches a store.
    pub fn verify(&self, access_token: &str) -> Result<SessionClaim, ServiceError> {
        Ok(self.identity.verify(access_token)?)
    }

    /// Requester facts for evaluating `operation` on `table`.
    ///
    /// The linked employee is read from the authorization record table, so it
    /// is never resolved for that table itself; rules there are claim-only.
    pub async fn context(
        &self,
        claim: &SessionClaim,
        table: Table,
        operation: Operation,
    ) -> Result<EvalContext, ServiceError> {
        let linked = if table != Table::AUTHORIZATION_RECORDS && self.rules.needs_link(table, operation) {
            self.directory
                .account(claim.sub)
                .await?
                .and_then(|a| a.linked_employee_id)
        } else {
            None
        };
        Ok(EvalContext::from_claim(claim, linked))
    }

    /// Decide a single row access; returns the evaluated context on success.
    pub async fn check(
        &self,
        claim: &SessionClaim,
        table: Table,
        operation: Operation,
        row: RowFacts,
    ) -> Result<EvalContext, ServiceError> {
        let ctx = self.context(claim, table, operation).await?;
        if let Err(denied) = self.rules.authorize(table, operation, &ctx, &row) {
            debug!(account_id = %claim.sub, %table, %operation, "policy denied");
            return Err(denied.into());
        }
        Ok(ctx)
    }
}

impl core::fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyGate")
            .field("rules", &self.rules.rules().len())
            .finish_non_exhaustive()
    }
}
