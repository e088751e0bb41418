//! Postgres-backed audit trail (`audit_log` table, insert/select only).

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use hrms_audit::{AuditEntry, AuditStore, AuditStoreError};
use hrms_core::{AccountId, AuditEntryId};

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

const INSERT: &str = r#"
    INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, detail, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

fn insert(entry: &AuditEntry) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT)
        .bind(entry.id.as_uuid())
        .bind(entry.actor_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id.as_deref())
        .bind(&entry.detail)
        .bind(entry.created_at)
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        insert(&entry)
            .execute(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn append_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for entry in &entries {
            insert(entry).execute(&mut *tx).await.map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, entity_type, entity_id, detail, created_at
            FROM audit_log
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, AuditStoreError> {
    let action: String = row.try_get("action").map_err(unavailable)?;
    let entity_type: String = row.try_get("entity_type").map_err(unavailable)?;

    Ok(AuditEntry {
        id: AuditEntryId::from_uuid(row.try_get("id").map_err(unavailable)?),
        actor_id: AccountId::from_uuid(row.try_get("actor_id").map_err(unavailable)?),
        action: parse_tag(&action)?,
        entity_type: parse_tag(&entity_type)?,
        entity_id: row.try_get("entity_id").map_err(unavailable)?,
        detail: row.try_get("detail").map_err(unavailable)?,
        created_at: row.try_get("created_at").map_err(unavailable)?,
    })
}

/// Tags are stored as their serde names.
fn parse_tag<T: DeserializeOwned>(tag: &str) -> Result<T, AuditStoreError> {
    serde_json::from_value(serde_json::Value::String(tag.to_string()))
        .map_err(|e| AuditStoreError::Unavailable(format!("corrupt audit row: {e}")))
}

fn unavailable(err: sqlx::Error) -> AuditStoreError {
    AuditStoreError::Unavailable(err.to_string())
}
