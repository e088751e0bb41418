//! `hrms-audit`: append-only audit trail.
//!
//! Recording is fire-and-forget: entries are handed to a background worker
//! over a bounded channel and the caller never waits on (or learns about)
//! persistence failures.

pub mod entry;
pub mod recorder;
pub mod store;

pub use entry::{AuditAction, AuditEntry, EntityType};
pub use recorder::{AuditConfig, AuditRecorder};
pub use store::{AuditStore, AuditStoreError, InMemoryAuditStore};
