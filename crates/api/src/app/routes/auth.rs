//! Credential exchange. These routes take no verified claim: sign-out must
//! still revoke the refresh token when the access claim has expired.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use hrms_auth::Credentials;
use hrms_infra::Services;

use crate::app::dto::{AccountView, RefreshRequest, RegisterRequest, ResetPasswordRequest};
use crate::app::errors;
use crate::middleware::extract_bearer;

pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/password-reset", post(reset_password))
}

/// POST /auth/register - new accounts start at `employee` with no link
pub async fn register(
    Extension(services): Extension<Services>,
    Json(body): Json<RegisterRequest>,
) -> axum::response::Response {
    match services.identity.register(&body.email, &body.password).await {
        Ok(account) => (StatusCode::CREATED, Json(AccountView::from(&account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /auth/sign-in
pub async fn sign_in(
    Extension(services): Extension<Services>,
    Json(credentials): Json<Credentials>,
) -> axum::response::Response {
    match services.identity.authenticate(&credentials).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/refresh - rotates the refresh token; the new claim embeds the
/// privilege currently on record
pub async fn refresh(
    Extension(services): Extension<Services>,
    Json(body): Json<RefreshRequest>,
) -> axum::response::Response {
    match services.identity.refresh(&body.refresh_token).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/sign-out
pub async fn sign_out(
    Extension(services): Extension<Services>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> StatusCode {
    let token = extract_bearer(&headers).unwrap_or_default();
    services.identity.sign_out(token, &body.refresh_token);
    StatusCode::NO_CONTENT
}

/// POST /auth/password-reset - redeem a one-time reset token
pub async fn reset_password(
    Extension(services): Extension<Services>,
    Json(body): Json<ResetPasswordRequest>,
) -> axum::response::Response {
    match services.identity.reset_password(&body.token, &body.new_password).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
