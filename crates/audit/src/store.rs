use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::AuditEntry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditStoreError {
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("audit store lock poisoned")]
    Poisoned,
}

/// Append-only persistence for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError>;

    /// Persist all entries or none of them.
    async fn append_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditStoreError>;

    /// Newest entries first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError>;
}

#[async_trait]
impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        (**self).append(entry).await
    }

    async fn append_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
        (**self).append_batch(entries).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        (**self).recent(limit).await
    }
}

/// In-memory audit store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot in insertion order.
    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        self.entries
            .write()
            .map_err(|_| AuditStoreError::Poisoned)?
            .push(entry);
        Ok(())
    }

    async fn append_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
        // Single write guard: readers see either none or all of the batch.
        self.entries
            .write()
            .map_err(|_| AuditStoreError::Poisoned)?
            .extend(entries);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let entries = self.entries.read().map_err(|_| AuditStoreError::Poisoned)?;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
