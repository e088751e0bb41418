use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use hrms_core::AccountId;
use hrms_infra::Services;

use crate::app::dto::{LinkRequest, PrivilegeRequest, ResetTokenResponse};
use crate::app::errors;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/authorization", get(read_authorization))
        .route("/:id/privilege", put(change_privilege))
        .route("/:id/link", put(link).delete(unlink))
        .route("/:id/password-reset", post(issue_password_reset))
}

/// GET /accounts/:id/authorization
pub async fn read_authorization(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<AccountId>,
) -> axum::response::Response {
    match services.privileges.read_authorization_record(caller.token(), id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("account {id} not found")),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /accounts/:id/privilege
pub async fn change_privilege(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<AccountId>,
    Json(body): Json<PrivilegeRequest>,
) -> axum::response::Response {
    match services
        .privileges
        .change_privilege(caller.token(), id, body.privilege)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /accounts/:id/link
pub async fn link(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<AccountId>,
    Json(body): Json<LinkRequest>,
) -> axum::response::Response {
    match services.linkage.link(caller.token(), id, body.employee_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// DELETE /accounts/:id/link
pub async fn unlink(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<AccountId>,
) -> axum::response::Response {
    match services.linkage.unlink(caller.token(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /accounts/:id/password-reset
pub async fn issue_password_reset(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<AccountId>,
) -> axum::response::Response {
    match services.privileges.issue_password_reset(caller.token(), id).await {
        Ok(reset_token) => (StatusCode::CREATED, Json(ResetTokenResponse { reset_token })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
