//! Analysis read hooks.

use super::{keys, QueryHandle, Queries};
use flightdeck_cache::query_fn;
use flightdeck_core::{Analysis, AnalysisId};
use std::sync::Arc;
use tracing::debug;

impl Queries {
    pub fn analyses(&self, skip: u32, limit: u32) -> QueryHandle<Vec<Analysis>> {
        let api = Arc::clone(&self.api);
        let load = query_fn(move || {
            let api = Arc::clone(&api);
            async move { api.get_analyses(skip, limit).await }
        });
        QueryHandle::new(
            self.cache.clone(),
            keys::analyses_page(skip, limit),
            load,
            Some(Vec::new()),
            None,
        )
    }

    /// A single analysis. Disabled when `id` is empty.
    pub fn analysis(&self, id: &AnalysisId) -> QueryHandle<Analysis> {
        let key = keys::analysis(id);
        if id.is_empty() {
            debug!("Analysis query disabled for empty id");
            return QueryHandle::disabled(self.cache.clone(), key, None);
        }
        let api = Arc::clone(&self.api);
        let id = id.clone();
        let load = query_fn(move || {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.get_analysis(&id).await }
        });
        QueryHandle::new(self.cache.clone(), key, load, None, None)
    }
}
