//! Fire-and-forget audit hand-off.
//!
//! ```text
//! handler ──record()──► bounded mpsc ──► worker ──► AuditStore
//!            (never waits)                 (retries with backoff, then drops)
//! ```
//!
//! `record` must only be called after the guarded operation has committed.
//! Nothing the worker does can reach back to the caller.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use hrms_core::AccountId;

use crate::{AuditAction, AuditEntry, AuditStore, EntityType};

#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Queue capacity; entries beyond it are dropped with a warning.
    pub capacity: usize,
    /// Retries after the first failed write.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each subsequent one.
    pub retry_backoff: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
enum Message {
    Entries(Vec<AuditEntry>),
    Flush(oneshot::Sender<()>),
}

/// Cheap-to-clone handle to the audit worker.
///
/// The worker stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<Message>,
}

impl AuditRecorder {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S>(store: S, config: AuditConfig) -> Self
    where
        S: AuditStore + 'static,
    {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        tokio::spawn(run_worker(store, rx, config));
        Self { tx }
    }

    pub fn record(
        &self,
        actor_id: AccountId,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<String>,
        detail: Option<serde_json::Value>,
    ) {
        let mut entry = AuditEntry::new(actor_id, action, entity_type);
        entry.entity_id = entity_id;
        if let Some(detail) = detail {
            entry.detail = detail;
        }
        self.submit(entry);
    }

    pub fn submit(&self, entry: AuditEntry) {
        self.enqueue(vec![entry]);
    }

    /// Entries are persisted together or not at all.
    pub fn record_batch(&self, entries: Vec<AuditEntry>) {
        if entries.is_empty() {
            return;
        }
        self.enqueue(entries);
    }

    fn enqueue(&self, entries: Vec<AuditEntry>) {
        let count = entries.len();
        match self.tx.try_send(Message::Entries(entries)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(dropped = count, "audit queue full; dropping entries");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(dropped = count, "audit worker stopped; dropping entries");
            }
        }
    }

    /// Wait until everything enqueued before this call has been processed
    /// (persisted or given up on).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker<S: AuditStore>(store: S, mut rx: mpsc::Receiver<Message>, config: AuditConfig) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Entries(entries) => write_with_retry(&store, entries, &config).await,
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("audit worker stopped");
}

async fn write_with_retry<S: AuditStore>(store: &S, entries: Vec<AuditEntry>, config: &AuditConfig) {
    let mut delay = config.retry_backoff;

    for attempt in 0..=config.max_retries {
        let result = match entries.as_slice() {
            [single] => store.append(single.clone()).await,
            _ => store.append_batch(entries.clone()).await,
        };

        match result {
            Ok(()) => return,
            Err(e) if attempt < config.max_retries => {
                debug!(attempt = attempt + 1, error = %e, "audit write failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
                warn!(error = %e, ?actions, "audit write failed; dropping entries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::{AuditStoreError, InMemoryAuditStore};

    fn fast_config() -> AuditConfig {
        AuditConfig {
            capacity: 16,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[derive(Default)]
    struct DownStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AuditStore for DownStore {
        async fn append(&self, _entry: AuditEntry) -> Result<(), AuditStoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AuditStoreError::Unavailable("outage".into()))
        }

        async fn append_batch(&self, _entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AuditStoreError::Unavailable("outage".into()))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
            Ok(vec![])
        }
    }

    struct GatedStore {
        gate: Semaphore,
        inner: InMemoryAuditStore,
    }

    #[async_trait]
    impl AuditStore for GatedStore {
        async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
            self.gate
                .acquire()
                .await
                .map_err(|_| AuditStoreError::Unavailable("closed".into()))?
                .forget();
            self.inner.append(entry).await
        }

        async fn append_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditStoreError> {
            self.inner.append_batch(entries).await
        }

        async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
            self.inner.recent(limit).await
        }
    }

    #[tokio::test]
    async fn recorded_entries_reach_the_store() {
        let store = Arc::new(InMemoryAuditStore::new());
        let recorder = AuditRecorder::spawn(store.clone(), fast_config());
        let actor = AccountId::new();

        recorder.record(actor, AuditAction::SignIn, EntityType::Session, None, None);
        recorder.record(
            actor,
            AuditAction::PrivilegeChanged,
            EntityType::Account,
            Some(actor.to_string()),
            Some(serde_json::json!({ "from": "employee", "to": "hr" })),
        );
        recorder.flush().await;

        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].action, AuditAction::PrivilegeChanged);
        assert_eq!(all[1].detail["to"], "hr");
    }

    #[tokio::test]
    async fn batch_is_written_in_one_call() {
        let store = Arc::new(InMemoryAuditStore::new());
        let recorder = AuditRecorder::spawn(store.clone(), fast_config());
        let actor = AccountId::new();

        recorder.record_batch(vec![
            AuditEntry::new(actor, AuditAction::Created, EntityType::Employee),
            AuditEntry::new(actor, AuditAction::EmployeeLinked, EntityType::Account),
        ]);
        recorder.record_batch(vec![]);
        recorder.flush().await;

        assert_eq!(store.all().len(), 2);
    }

    #[tokio::test]
    async fn store_outage_is_retried_then_dropped_without_reaching_caller() {
        let store = Arc::new(DownStore::default());
        let recorder = AuditRecorder::spawn(store.clone(), fast_config());

        recorder.record(AccountId::new(), AuditAction::SignOut, EntityType::Session, None, None);
        recorder.flush().await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let store = Arc::new(GatedStore {
            gate: Semaphore::new(0),
            inner: InMemoryAuditStore::new(),
        });
        let recorder = AuditRecorder::spawn(
            store.clone(),
            AuditConfig {
                capacity: 1,
                ..fast_config()
            },
        );

        let actor = AccountId::new();
        for _ in 0..10 {
            recorder.record(actor, AuditAction::Updated, EntityType::LeaveRequest, None, None);
        }

        store.gate.add_permits(10);
        recorder.flush().await;

        let persisted = store.inner.all().len();
        assert!((1..=2).contains(&persisted), "persisted {persisted}");
    }
}
