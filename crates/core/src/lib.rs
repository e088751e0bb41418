//! `hrms-core`: shared domain primitives (identifiers, errors, entity trait).
//!
//! This crate is intentionally free of storage, transport and auth concerns.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, validate_email};
pub use id::{AccountId, AttendanceId, AuditEntryId, EmployeeId, LeaveRequestId};
