//! `hrms-auth`: privilege levels, session claims and row policies.
//!
//! Decoupled from HTTP and storage: the backend is a trait, policies are pure.

pub mod backend;
pub mod claims;
pub mod policy;
pub mod privilege;

pub use backend::{
    Activity, AuthBackend, AuthError, AuthorizationRecord, AuthorizationUpdate, BackendError, Credentials,
    EmployeeSummary, IssuedSession, RefreshToken,
};
pub use claims::{ClaimError, ClaimSigner, SessionClaim, SignedClaim, validate_claims};
pub use policy::{EvalContext, Operation, PolicyError, PolicyRule, Predicate, RowFacts, RuleSet, Table};
pub use privilege::{Privilege, UnknownPrivilege};
