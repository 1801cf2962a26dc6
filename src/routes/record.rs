//! Record CRUD routes. Handlers resolve the collection from the path segment,
//! so one route table serves every configured collection.

use crate::handlers::record::{create, delete, list, list_or_read, patch, replace};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn record_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:key",
            get(list_or_read).put(replace).patch(patch).delete(delete),
        )
        .with_state(state)
}
