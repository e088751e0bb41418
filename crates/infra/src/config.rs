//! Process configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use hrms_audit::AuditConfig;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub claim_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub bind_addr: String,
    /// Postgres connection string; `None` selects the in-memory stores.
    pub database_url: Option<String>,
    pub audit: AuditConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            claim_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::days(7),
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            audit: AuditConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let claim_ttl = parse_u64(&lookup, "CLAIM_TTL_SECS")?
            .map(|s| chrono::Duration::seconds(s as i64))
            .unwrap_or(defaults.claim_ttl);
        let refresh_ttl = parse_u64(&lookup, "REFRESH_TTL_SECS")?
            .map(|s| chrono::Duration::seconds(s as i64))
            .unwrap_or(defaults.refresh_ttl);

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(v) => v.parse::<bool>().map_err(|_| ConfigError::Invalid {
                key: "USE_PERSISTENT_STORES",
                value: v,
            })?,
            None => false,
        };
        let database_url = if use_persistent {
            Some(lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let audit = AuditConfig {
            capacity: parse_u64(&lookup, "AUDIT_QUEUE_CAPACITY")?
                .map(|v| v as usize)
                .unwrap_or(defaults.audit.capacity),
            max_retries: parse_u64(&lookup, "AUDIT_MAX_RETRIES")?
                .map(|v| v as u32)
                .unwrap_or(defaults.audit.max_retries),
            retry_backoff: parse_u64(&lookup, "AUDIT_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.audit.retry_backoff),
        };

        Ok(Self {
            jwt_secret,
            claim_ttl,
            refresh_ttl,
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url,
            audit,
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
