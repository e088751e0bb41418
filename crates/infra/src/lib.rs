//! Infrastructure layer: stores, claim issuance, policy gate and the
//! services built on them.

pub mod audit_log;
pub mod backend;
pub mod config;
pub mod directory;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod identity;
pub mod linkage;
pub mod privileges;
pub mod schema;
pub mod services;

#[cfg(test)]
mod integration_tests;

pub use backend::LocalBackend;
pub use config::{AppConfig, ConfigError};
pub use error::ServiceError;
pub use services::Services;
