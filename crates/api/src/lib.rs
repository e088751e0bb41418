//! HTTP API: routing, bearer-claim extraction and error mapping over the
//! infrastructure services.

pub mod app;
pub mod context;
pub mod middleware;
