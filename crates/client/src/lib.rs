//! `hrms-client`: the client-side session layer.
//!
//! [`SessionContext`] owns the signed claim and reconciles it with the
//! authorization record; [`HttpBackend`] talks to the API.

pub mod context;
pub mod http;
pub mod session;

#[cfg(test)]
mod context_tests;

pub use context::SessionContext;
pub use http::HttpBackend;
pub use session::{Phase, Session, SessionError};
