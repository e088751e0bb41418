//! Session claims: the signed, time-bounded snapshot a client presents on
//! every operation.

use std::collections::HashSet;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrms_core::AccountId;

use crate::Privilege;

pub const ISSUER: &str = "hrms";

/// Claim payload.
///
/// `privilege` is optional: a claim issued before any privilege was assigned
/// (or by a path that does not embed it) carries none, and the claims
/// synchronizer has to read the authorization record instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaim {
    /// Subject: the authenticated account.
    pub sub: AccountId,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege: Option<Privilege>,

    pub iss: String,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("claim has expired")]
    Expired,

    #[error("claim not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid claim time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    /// Bad signature, wrong issuer, or undecodable payload.
    #[error("malformed claim: {0}")]
    Malformed(String),

    #[error("failed to sign claim: {0}")]
    Signing(String),
}

/// Check the validity window of an already-decoded claim.
pub fn validate_claims(claim: &SessionClaim, now: DateTime<Utc>) -> Result<(), ClaimError> {
    if claim.expires_at <= claim.issued_at {
        return Err(ClaimError::InvalidTimeWindow);
    }
    if now < claim.issued_at {
        return Err(ClaimError::NotYetValid);
    }
    if claim.is_expired(now) {
        return Err(ClaimError::Expired);
    }
    Ok(())
}

/// A claim together with its compact signed encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaim {
    pub token: String,
    pub claim: SessionClaim,
}

/// HS256 issuer/verifier for session claims.
///
/// Expiry is checked by [`validate_claims`] against a caller-supplied clock
/// rather than by `jsonwebtoken`, so tests can move time.
pub struct ClaimSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl ClaimSigner {
    pub fn hs256(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh claim valid for the configured TTL starting at `now`.
    pub fn issue(
        &self,
        sub: AccountId,
        email: impl Into<String>,
        privilege: Option<Privilege>,
        now: DateTime<Utc>,
    ) -> Result<SignedClaim, ClaimError> {
        let issued_at = now.trunc_subsecs(0);
        let claim = SessionClaim {
            sub,
            email: email.into(),
            privilege,
            iss: ISSUER.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claim, &self.encoding)
            .map_err(|e| ClaimError::Signing(e.to_string()))?;

        Ok(SignedClaim { token, claim })
    }

    /// Verify signature and issuer, then the validity window.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaim, ClaimError> {
        let data = jsonwebtoken::decode::<SessionClaim>(token, &self.decoding, &self.validation)
            .map_err(|e| ClaimError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl core::fmt::Debug for ClaimSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClaimSigner").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
