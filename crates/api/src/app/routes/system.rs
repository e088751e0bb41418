use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use hrms_infra::Services;

use crate::app::dto::MeResponse;
use crate::app::errors;
use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - the caller's claim next to their authorization record
pub async fn me(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services
        .privileges
        .read_authorization_record(caller.token(), caller.account_id())
        .await
    {
        Ok(record) => Json(MeResponse {
            account_id: caller.account_id(),
            email: caller.claim().email.clone(),
            claim_privilege: caller.claim().privilege,
            record,
        })
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
