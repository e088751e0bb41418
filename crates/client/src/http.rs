//! [`AuthBackend`] over the HTTP API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hrms_auth::{
    Activity, AuthBackend, AuthError, AuthorizationRecord, AuthorizationUpdate, BackendError, ClaimError,
    Credentials, EmployeeSummary, IssuedSession, Privilege, RefreshToken,
};
use hrms_core::{AccountId, EmployeeId};

/// Error body returned by the API: `{ "error": "<code>", "message": "..." }`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a RefreshToken,
}

#[derive(Serialize)]
struct PrivilegeRequest {
    privilege: Privilege,
}

#[derive(Serialize)]
struct LinkRequest {
    employee_id: EmployeeId,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.client.request(method, self.url(path)).bearer_auth(access_token)
    }

    async fn issue(&self, request: RequestBuilder) -> Result<IssuedSession, AuthError> {
        let resp = request
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| AuthError::Unavailable(format!("parse error: {e}")));
        }

        let body = error_body(resp).await;
        debug!(%status, code = %body.error, "credential exchange failed");
        Err(match (status, body.error.as_str()) {
            (StatusCode::UNAUTHORIZED, "expired_refresh") => AuthError::ExpiredRefresh,
            (StatusCode::UNAUTHORIZED, _) => AuthError::InvalidCredentials,
            _ => AuthError::Unavailable(format!("{status}: {}", body.message)),
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let resp = request
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = error_body(resp).await;
        debug!(%status, code = %body.error, "request rejected");
        Err(backend_error(status, body))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(format!("parse error: {e}")))
    }
}

async fn error_body(resp: Response) -> ErrorBody {
    resp.json().await.unwrap_or_default()
}

fn backend_error(status: StatusCode, body: ErrorBody) -> BackendError {
    let ErrorBody { error, message } = body;
    match status {
        StatusCode::UNAUTHORIZED if error == "claim_expired" => BackendError::ClaimRejected(ClaimError::Expired),
        StatusCode::UNAUTHORIZED => BackendError::ClaimRejected(ClaimError::Malformed(message)),
        StatusCode::FORBIDDEN => BackendError::Denied(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BackendError::Invalid(message),
        other => BackendError::Unavailable(format!("{other}: {message}")),
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedSession, AuthError> {
        self.issue(self.client.post(self.url("/auth/sign-in")).json(credentials))
            .await
    }

    async fn refresh_claim(&self, refresh_token: &RefreshToken) -> Result<IssuedSession, AuthError> {
        self.issue(
            self.client
                .post(self.url("/auth/refresh"))
                .json(&RefreshRequest { refresh_token }),
        )
        .await
    }

    async fn read_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
    ) -> Result<Option<AuthorizationRecord>, BackendError> {
        let path = format!("/accounts/{account_id}/authorization");
        match self.fetch(self.authed(Method::GET, &path, access_token)).await {
            Ok(record) => Ok(Some(record)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_authorization_record(
        &self,
        access_token: &str,
        account_id: AccountId,
        update: AuthorizationUpdate,
    ) -> Result<(), BackendError> {
        let request = match update {
            AuthorizationUpdate::Privilege { privilege } => self
                .authed(Method::PUT, &format!("/accounts/{account_id}/privilege"), access_token)
                .json(&PrivilegeRequest { privilege }),
            AuthorizationUpdate::Link { employee_id } => self
                .authed(Method::PUT, &format!("/accounts/{account_id}/link"), access_token)
                .json(&LinkRequest { employee_id }),
            AuthorizationUpdate::Unlink => {
                self.authed(Method::DELETE, &format!("/accounts/{account_id}/link"), access_token)
            }
        };
        self.send(request).await?;
        Ok(())
    }

    async fn unlinked_employees(&self, access_token: &str) -> Result<Vec<EmployeeSummary>, BackendError> {
        self.fetch(self.authed(Method::GET, "/employees/unlinked", access_token))
            .await
    }

    async fn sign_out(&self, access_token: &str, refresh_token: &RefreshToken) -> Result<(), BackendError> {
        self.send(
            self.authed(Method::POST, "/auth/sign-out", access_token)
                .json(&RefreshRequest { refresh_token }),
        )
        .await?;
        Ok(())
    }

    async fn record_activity(&self, access_token: &str, activity: Activity) -> Result<(), BackendError> {
        self.send(self.authed(Method::POST, "/audit", access_token).json(&activity))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(error: &str, message: &str) -> ErrorBody {
        ErrorBody {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn expired_claim_is_distinguished_from_bad_claim() {
        assert_eq!(
            backend_error(StatusCode::UNAUTHORIZED, body("claim_expired", "expired")),
            BackendError::ClaimRejected(ClaimError::Expired)
        );
        assert!(matches!(
            backend_error(StatusCode::UNAUTHORIZED, body("claim_invalid", "bad signature")),
            BackendError::ClaimRejected(ClaimError::Malformed(_))
        ));
    }

    #[test]
    fn statuses_map_to_backend_errors() {
        assert!(matches!(
            backend_error(StatusCode::FORBIDDEN, body("denied", "")),
            BackendError::Denied(_)
        ));
        assert!(matches!(
            backend_error(StatusCode::CONFLICT, body("already_linked", "")),
            BackendError::Conflict(_)
        ));
        assert!(matches!(
            backend_error(StatusCode::UNPROCESSABLE_ENTITY, body("validation_error", "")),
            BackendError::Invalid(_)
        ));
        assert!(matches!(
            backend_error(StatusCode::BAD_GATEWAY, ErrorBody::default()),
            BackendError::Unavailable(_)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:8080/");
        assert_eq!(backend.url("/health"), "http://localhost:8080/health");
    }
}
