use axum::{Router, routing::get};

pub mod accounts;
pub mod audit;
pub mod auth;
pub mod employees;
pub mod records;
pub mod system;

/// Router for every endpoint that requires a verified claim.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .nest("/accounts", accounts::router())
        .nest("/employees", employees::router())
        .nest("/leave-requests", records::leave_router())
        .nest("/attendance", records::attendance_router())
        .nest("/audit", audit::router())
}

pub(crate) fn unexpected(response: hrms_infra::gateway::DataResponse) -> axum::response::Response {
    tracing::error!(?response, "gateway returned an unexpected response");
    crate::app::errors::json_error(
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "unexpected response",
    )
}
