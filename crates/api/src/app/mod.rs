//! Router assembly.
//!
//! - `routes/`: one file per resource
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: `{ error, message }` responses

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use hrms_infra::Services;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router over already-wired services.
pub fn build_app(services: Services) -> Router {
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::auth_middleware,
        ));

    let public = routes::auth::public_router().layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::log_request)))
}
