//! In-process [`AuthBackend`] over the wired services.

use async_trait::async_trait;

use hrms_auth::{
    Activity, AuthBackend, AuthError, AuthorizationRecord, AuthorizationUpdate, BackendError, Credentials,
    EmployeeSummary, IssuedSession, RefreshToken,
};
use hrms_core::AccountId;

use crate::gateway::DataRequest;
use crate::services::Services;

#[derive(Debug, Clone)]
pub struct LocalBackend {
    services: Services,
}

impl LocalBackend {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

#[async_trait]
impl AuthBackend for LocalBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError> {
        self.services.identity.authenticate(credentials).await
    }

    async fn refresh_claim(&self, refresh_token: &RefreshToken) -> Result<IssuedSession, AuthError> {
        self.services.identity.refresh(refresh_token).await
    }

    async fn read_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, BackendError> {
        Ok(self
            .services
            .privileges
            .read_authorization_record(access_token, account_id)
            .await?)
    }

    async fn write_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
        update: AuthorizationUpdate,
    ) -> Result<(), BackendError> {
        match update {
            AuthorizationUpdate::Privilege { privilege } => {
                self.services
                    .privileges
                    .change_privilege(access_token, account_id, privilege)
                    .await?;
            }
            AuthorizationUpdate::Link { employee_id } => {
                self.services
                    .linkage
                    .link(access_token, account_id, employee_id)
                    .await?;
            }
            AuthorizationUpdate::Unlink => {
                self.services.linkage.unlink(access_token, account_id).await?;
            }
        }
        Ok(())
    }

    async fn unlinked_employees(&self, access_token: &str) -> Result<Vec<EmployeeSummary>, BackendError> {
        Ok(self.services.linkage.unlinked_employees(access_token).await?)
    }

    async fn sign_out(&self, access_token: &str, refresh_token: &RefreshToken) -> Result<(), BackendError> {
        self.services.identity.sign_out(access_token, refresh_token);
        Ok(())
    }

    async fn record_activity(&self, access_token: &str, activity: Activity) -> Result<(), BackendError> {
        let request = DataRequest::RecordActivity {
            action: activity.action,
            entity_type: activity.entity_type,
            entity_id: activity.entity_id,
            detail: activity.detail,
        };
        self.services
            .gateway
            .evaluate_and_execute(access_token, request)
            .await?;
        Ok(())
    }
}
