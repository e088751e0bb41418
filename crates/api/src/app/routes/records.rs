//! Leave requests and attendance. Listings take an explicit scope; asking
//! for a scope outside the caller's reach is a 403, never an empty list.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use hrms_core::LeaveRequestId;
use hrms_infra::Services;
use hrms_infra::gateway::{DataRequest, DataResponse};

use crate::app::dto::{CreateLeaveRequest, DecideLeaveRequest, RecordAttendanceRequest, ScopeQuery};
use crate::app::errors;
use crate::context::CallerContext;

pub fn leave_router() -> Router {
    Router::new()
        .route("/", get(list_leave).post(create_leave))
        .route("/:id", axum::routing::delete(delete_leave))
        .route("/:id/decision", put(decide_leave))
}

pub fn attendance_router() -> Router {
    Router::new().route("/", get(list_attendance).post(record_attendance))
}

async fn execute(
    services: &Services,
    caller: &CallerContext,
    request: DataRequest,
    status: StatusCode,
) -> axum::response::Response {
    match services.gateway.evaluate_and_execute(caller.token(), request).await {
        Ok(DataResponse::LeaveRequest(leave)) => (status, Json(leave)).into_response(),
        Ok(DataResponse::LeaveRequests(rows)) => (status, Json(rows)).into_response(),
        Ok(DataResponse::Attendance(record)) => (status, Json(record)).into_response(),
        Ok(DataResponse::AttendanceRecords(rows)) => (status, Json(rows)).into_response(),
        Ok(DataResponse::Done) => StatusCode::NO_CONTENT.into_response(),
        Ok(other) => super::unexpected(other),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /leave-requests?employee_id=
pub async fn list_leave(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<ScopeQuery>,
) -> axum::response::Response {
    let request = DataRequest::ListLeave { scope: query.scope() };
    execute(&services, &caller, request, StatusCode::OK).await
}

/// POST /leave-requests
pub async fn create_leave(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<CreateLeaveRequest>,
) -> axum::response::Response {
    let request = DataRequest::CreateLeave {
        employee_id: body.employee_id,
        starts_on: body.starts_on,
        ends_on: body.ends_on,
        reason: body.reason,
    };
    execute(&services, &caller, request, StatusCode::CREATED).await
}

/// PUT /leave-requests/:id/decision
pub async fn decide_leave(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<LeaveRequestId>,
    Json(body): Json<DecideLeaveRequest>,
) -> axum::response::Response {
    let request = DataRequest::DecideLeave {
        id,
        approve: body.approve,
    };
    execute(&services, &caller, request, StatusCode::OK).await
}

/// DELETE /leave-requests/:id
pub async fn delete_leave(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<LeaveRequestId>,
) -> axum::response::Response {
    execute(&services, &caller, DataRequest::DeleteLeave { id }, StatusCode::NO_CONTENT).await
}

/// GET /attendance?employee_id=
pub async fn list_attendance(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<ScopeQuery>,
) -> axum::response::Response {
    let request = DataRequest::ListAttendance { scope: query.scope() };
    execute(&services, &caller, request, StatusCode::OK).await
}

/// POST /attendance
pub async fn record_attendance(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<RecordAttendanceRequest>,
) -> axum::response::Response {
    let request = DataRequest::RecordAttendance {
        employee_id: body.employee_id,
        work_date: body.work_date,
        hours: body.hours,
    };
    execute(&services, &caller, request, StatusCode::CREATED).await
}
