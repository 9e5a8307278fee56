//! Read operations over the query cache.
//!
//! Each read hook returns a [`QueryHandle`] bound to one cache key. While the
//! handle is alive it observes its entry: the entry is refetched when
//! invalidated and is not garbage collected. Polling handles additionally
//! refetch on a fixed interval while the application is visible.

pub mod alerts;
pub mod analyses;
pub mod keys;

use crate::api_client::FleetApi;
use flightdeck_cache::{ObserverGuard, QueryCache, QueryFn, QueryKey};
use flightdeck_core::ApiError;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Whether the application is currently in the foreground.
#[derive(Debug, Clone)]
pub struct Visibility {
    state: Arc<watch::Sender<bool>>,
}

impl Visibility {
    pub fn new(visible: bool) -> Self {
        let (state, _) = watch::channel(visible);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.state.borrow()
    }

    pub fn set_visible(&self, visible: bool) {
        self.state.send_if_modified(|current| {
            let changed = *current != visible;
            *current = visible;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What a consumer renders from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    /// Cached data, or the hook's fallback before the first success.
    pub data: Option<T>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// Any fetch is running, including background refetches.
    pub is_fetching: bool,
    pub error: Option<ApiError>,
}

impl<T> QueryResult<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Entry point for the read hooks.
#[derive(Clone)]
pub struct Queries {
    pub(crate) cache: QueryCache,
    pub(crate) api: Arc<dyn FleetApi>,
    pub(crate) visibility: Visibility,
    pub(crate) poll_interval: Duration,
}

impl Queries {
    pub fn new(
        cache: QueryCache,
        api: Arc<dyn FleetApi>,
        visibility: Visibility,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cache,
            api,
            visibility,
            poll_interval,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn polling(&self, enabled: bool) -> Option<(Visibility, Duration)> {
        enabled.then(|| (self.visibility.clone(), self.poll_interval))
    }
}

/// Handle on one cached query.
pub struct QueryHandle<T> {
    cache: QueryCache,
    key: QueryKey,
    query_fn: Option<QueryFn>,
    fallback: Option<T>,
    _observer: Option<ObserverGuard>,
    poller: Option<JoinHandle<()>>,
}

impl<T> QueryHandle<T>
where
    T: DeserializeOwned + Clone,
{
    pub(crate) fn new(
        cache: QueryCache,
        key: QueryKey,
        query_fn: QueryFn,
        fallback: Option<T>,
        polling: Option<(Visibility, Duration)>,
    ) -> Self {
        let observer = cache.observe(&key, Some(Arc::clone(&query_fn)));
        let poller = polling.map(|(visibility, interval)| {
            spawn_poller(cache.clone(), key.clone(), visibility.subscribe(), interval)
        });
        Self {
            cache,
            key,
            query_fn: Some(query_fn),
            fallback,
            _observer: Some(observer),
            poller,
        }
    }

    /// A handle that never fetches and always reports the fallback.
    pub(crate) fn disabled(cache: QueryCache, key: QueryKey, fallback: Option<T>) -> Self {
        Self {
            cache,
            key,
            query_fn: None,
            fallback,
            _observer: None,
            poller: None,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.query_fn.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Serve fresh cached data, fetching only when missing or stale.
    pub async fn load(&self) -> QueryResult<T> {
        if let Some(query_fn) = &self.query_fn {
            if let Err(err) = self.cache.ensure(&self.key, Arc::clone(query_fn)).await {
                debug!(key = %self.key, error = %err, "Query load failed");
            }
        }
        self.result()
    }

    /// Fetch regardless of freshness.
    pub async fn refetch(&self) -> QueryResult<T> {
        if let Some(query_fn) = &self.query_fn {
            if let Err(err) = self.cache.fetch(&self.key, Arc::clone(query_fn)).await {
                debug!(key = %self.key, error = %err, "Query refetch failed");
            }
        }
        self.result()
    }

    /// Current state without triggering a fetch.
    pub fn result(&self) -> QueryResult<T> {
        let Some(entry) = self.cache.read(&self.key).filter(|_| self.is_enabled()) else {
            return QueryResult {
                data: self.fallback.clone(),
                is_loading: false,
                is_fetching: false,
                error: None,
            };
        };

        let mut error = entry.error.clone();
        let data = match entry.data.as_ref() {
            Some(_) => match entry.data_as::<T>() {
                Some(data) => Some(data),
                None => {
                    error = Some(ApiError::decode(format!(
                        "cached data for {} has an unexpected shape",
                        self.key
                    )));
                    self.fallback.clone()
                }
            },
            None => self.fallback.clone(),
        };

        QueryResult {
            data,
            is_loading: entry.is_fetching && entry.data.is_none(),
            is_fetching: entry.is_fetching,
            error,
        }
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Refetch `key` every `interval` while visible.
///
/// Hidden time pauses the schedule. On becoming visible again the entry is
/// refetched right away if it went stale meanwhile, then the schedule
/// restarts.
fn spawn_poller(
    cache: QueryCache,
    key: QueryKey,
    mut visible: watch::Receiver<bool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut resumed = false;
        loop {
            if visible.wait_for(|visible| *visible).await.is_err() {
                return;
            }
            if resumed {
                let stale = cache
                    .read(&key)
                    .map(|entry| entry.is_stale(cache.config().stale_time, Instant::now()))
                    .unwrap_or(true);
                if stale {
                    debug!(key = %key, "Refetching on visibility");
                    cache.refetch(&key);
                }
            }
            resumed = true;

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(key = %key, "Polling refetch");
                        cache.refetch(&key);
                    }
                    changed = visible.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if !*visible.borrow_and_update() {
                            debug!(key = %key, "Polling paused");
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_toggles() {
        let visibility = Visibility::default();
        let mut rx = visibility.subscribe();
        assert!(visibility.is_visible());

        visibility.set_visible(true);
        assert!(!rx.has_changed().unwrap());

        visibility.set_visible(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }
}
