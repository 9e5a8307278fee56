//! Alert read hooks.

use super::{keys, QueryHandle, Queries};
use flightdeck_cache::query_fn;
use flightdeck_core::{Alert, AlertStats};
use std::sync::Arc;

impl Queries {
    /// One page of alerts. Reports an empty list until the first load.
    pub fn alerts(&self, skip: u32, limit: u32, polling: bool) -> QueryHandle<Vec<Alert>> {
        let api = Arc::clone(&self.api);
        let load = query_fn(move || {
            let api = Arc::clone(&api);
            async move { api.get_alerts(skip, limit).await }
        });
        QueryHandle::new(
            self.cache.clone(),
            keys::alerts_page(skip, limit),
            load,
            Some(Vec::new()),
            self.polling(polling),
        )
    }

    /// Alert totals per status and severity.
    pub fn alert_stats(&self, polling: bool) -> QueryHandle<AlertStats> {
        let api = Arc::clone(&self.api);
        let load = query_fn(move || {
            let api = Arc::clone(&api);
            async move { api.get_alert_stats().await }
        });
        QueryHandle::new(
            self.cache.clone(),
            keys::alert_stats(),
            load,
            None,
            self.polling(polling),
        )
    }
}
