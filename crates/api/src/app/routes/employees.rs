use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use hrms_core::EmployeeId;
use hrms_infra::Services;
use hrms_infra::gateway::{DataRequest, DataResponse};

use crate::app::dto::CreateEmployeeRequest;
use crate::app::errors;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_employee))
        .route("/unlinked", get(unlinked_employees))
        .route("/:id", get(get_employee))
}

/// GET /employees/unlinked - link candidates
pub async fn unlinked_employees(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.linkage.unlinked_employees(caller.token()).await {
        Ok(employees) => (StatusCode::OK, Json(employees)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /employees
pub async fn create_employee(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<CreateEmployeeRequest>,
) -> axum::response::Response {
    let request = DataRequest::CreateEmployee {
        full_name: body.full_name,
        position: body.position,
        department: body.department,
    };
    match services.gateway.evaluate_and_execute(caller.token(), request).await {
        Ok(DataResponse::Employee(employee)) => (StatusCode::CREATED, Json(employee)).into_response(),
        Ok(other) => super::unexpected(other),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /employees/:id
pub async fn get_employee(
    Extension(services): Extension<Services>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<EmployeeId>,
) -> axum::response::Response {
    match services
        .gateway
        .evaluate_and_execute(caller.token(), DataRequest::GetEmployee { id })
        .await
    {
        Ok(DataResponse::Employee(employee)) => (StatusCode::OK, Json(employee)).into_response(),
        Ok(other) => super::unexpected(other),
        Err(e) => errors::service_error_to_response(e),
    }
}
