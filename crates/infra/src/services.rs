//! Wiring of stores, gate and services for one process.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use hrms_audit::{AuditRecorder, AuditStore, InMemoryAuditStore};
use hrms_auth::{ClaimSigner, RuleSet};

use crate::audit_log::PostgresAuditStore;
use crate::config::AppConfig;
use crate::directory::{Directory, InMemoryDirectory, PostgresDirectory};
use crate::gate::PolicyGate;
use crate::gateway::DataGateway;
use crate::identity::IdentityProvider;
use crate::linkage::LinkageService;
use crate::privileges::PrivilegeService;
use crate::schema;

#[derive(Debug, Clone)]
pub struct Services {
    pub directory: Arc<dyn Directory>,
    pub identity: Arc<IdentityProvider>,
    pub gate: PolicyGate,
    pub linkage: LinkageService,
    pub privileges: PrivilegeService,
    pub gateway: DataGateway,
    pub audit: AuditRecorder,
}

impl Services {
    /// In-memory stores. Must be called inside a tokio runtime.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryAuditStore::new()),
        )
    }

    /// Postgres stores; creates the schema first.
    pub async fn postgres(config: &AppConfig, pool: PgPool) -> anyhow::Result<Self> {
        schema::ensure_schema(&pool).await?;
        info!("postgres stores ready");

        Ok(Self::assemble(
            config,
            Arc::new(PostgresDirectory::new(pool.clone())),
            Arc::new(PostgresAuditStore::new(pool)),
        ))
    }

    /// Build on caller-supplied stores (tests inject failing audit stores).
    pub fn assemble(
        config: &AppConfig,
        directory: Arc<dyn Directory>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        let audit = AuditRecorder::spawn(audit_store.clone(), config.audit.clone());
        let signer = Arc::new(ClaimSigner::hs256(config.jwt_secret.as_bytes(), config.claim_ttl));
        let identity = Arc::new(IdentityProvider::new(
            directory.clone(),
            signer,
            audit.clone(),
            config.refresh_ttl,
        ));
        let gate = PolicyGate::new(identity.clone(), directory.clone(), Arc::new(RuleSet::standard()));

        Self {
            linkage: LinkageService::new(gate.clone(), directory.clone(), audit.clone()),
            privileges: PrivilegeService::new(gate.clone(), directory.clone(), identity.clone(), audit.clone()),
            gateway: DataGateway::new(gate.clone(), directory.clone(), audit_store, audit.clone()),
            directory,
            identity,
            gate,
            audit,
        }
    }
}
