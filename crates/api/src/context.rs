use hrms_auth::SessionClaim;
use hrms_core::AccountId;

/// Verified caller for a request: the presented token and its decoded claim.
///
/// Services re-verify the token; the claim here is for handlers that only
/// need the subject.
#[derive(Debug, Clone)]
pub struct CallerContext {
    token: String,
    claim: SessionClaim,
}

impl CallerContext {
    pub fn new(token: String, claim: SessionClaim) -> Self {
        Self { token, claim }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claim(&self) -> &SessionClaim {
        &self.claim
    }

    pub fn account_id(&self) -> AccountId {
        self.claim.sub
    }
}
