use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use hrms_auth::Activity;
use hrms_infra::Services;
use hrms_infra::gateway::{DataRequest, DataResponse};

use crate::app::dto::AuditQuery;
use crate::app::errors;
use crate::context::CallerContext;

const DEFAULT_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new().route("/", get(recent).post(record_activity))
}

/// GET /audit?limit= - newest first; staff only
pub async fn recent(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    let request = DataRequest::RecentAudit {
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
    };
    match services.gateway.evaluate_and_execute(caller.token(), request).await {
        Ok(DataResponse::AuditEntries(entries)) => (StatusCode::OK, Json(entries)).into_response(),
        Ok(other) => super::unexpected(other),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /audit - accepted once handed to the recorder, not once persisted
pub async fn record_activity(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Json(activity): Json<Activity>,
) -> axum::response::Response {
    let request = DataRequest::RecordActivity {
        action: activity.action,
        entity_type: activity.entity_type,
        entity_id: activity.entity_id,
        detail: activity.detail,
    };
    match services.gateway.evaluate_and_execute(caller.token(), request).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
