//! Router assembly.

mod common;
mod record;

pub use common::common_routes;
pub use record::record_routes;

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Uri};
use axum::Router;
use tower_http::trace::TraceLayer;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Full application: common routes, record routes, body limit and request tracing.
/// Unmatched paths and verbs answer with the same JSON error body as handlers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(record_routes(state))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("route {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    AppError::MethodNotAllowed(format!("{} {}", method, uri.path()))
}
