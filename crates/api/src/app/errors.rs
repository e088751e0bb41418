use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use hrms_auth::AuthError;
use hrms_infra::ServiceError;

/// Map a service failure to `{ "error": <code>, "message": ... }`.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let status = match &err {
        ServiceError::Claim(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Denied(_) | ServiceError::SelfChangeRejected | ServiceError::EscalationRejected { .. } => {
            StatusCode::FORBIDDEN
        }
        ServiceError::AccountNotFound(_) | ServiceError::EmployeeNotFound(_) | ServiceError::NotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ServiceError::AlreadyLinked(_) | ServiceError::DuplicateEmail(_) => StatusCode::CONFLICT,
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unavailable(msg) => {
            error!(error = %msg, "store unavailable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials => json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string()),
        AuthError::ExpiredRefresh => json_error(StatusCode::UNAUTHORIZED, "expired_refresh", err.to_string()),
        AuthError::Unavailable(ref msg) => {
            error!(error = %msg, "authentication backend unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", err.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
