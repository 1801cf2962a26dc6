//! Shared application state for all routes: the store handle and the resolved collections.

use crate::config::ResolvedModel;
use crate::store::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Constructed once by the process entry point.
    pub store: Arc<dyn RecordStore>,
    pub model: Arc<ResolvedModel>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, model: ResolvedModel) -> Self {
        AppState {
            store,
            model: Arc::new(model),
        }
    }
}
