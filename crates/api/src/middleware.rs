use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, debug, info, info_span};

use hrms_auth::ClaimError;
use hrms_infra::Services;

use crate::app::errors::json_error;
use crate::context::CallerContext;

pub async fn auth_middleware(
    State(services): State<Services>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "missing_token", "bearer token required"))?
        .to_string();

    let claim = services.identity.verify(&token).map_err(|e| {
        debug!(error = %e, "claim rejected");
        let code = match e {
            ClaimError::Expired => "claim_expired",
            _ => "claim_invalid",
        };
        json_error(StatusCode::UNAUTHORIZED, code, e.to_string())
    })?;

    req.extensions_mut().insert(CallerContext::new(token, claim));
    Ok(next.run(req).await)
}

/// One span and one completion line per request.
pub async fn log_request(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let span = info_span!("request", method = %req.method(), path = %req.uri().path());
    let started = Instant::now();

    async move {
        let response = next.run(req).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }
    .instrument(span)
    .await
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
