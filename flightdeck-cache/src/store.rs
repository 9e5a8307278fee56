//! The query cache store.
//!
//! One `QueryCache` is constructed at application start and handed to every
//! hook. It is a cheap `Clone` over shared state; all mutation goes through
//! its methods and callers only ever see cloned [`QueryEntry`] snapshots.
//!
//! # Fetch lifecycle
//!
//! A fetch runs as a spawned task so that a caller giving up on it (a view
//! going away) does not cancel the network call; the result still lands in
//! the cache. Concurrent triggers for the same key share one task. Each
//! fetch carries a generation number, and a result is only applied if the
//! entry still expects that generation. `invalidate`, `cancel` and `remove`
//! drop the expectation, so a response that arrives after them is
//! discarded.

use flightdeck_core::{ApiError, ApiResult};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::entry::{QueryEntry, QueryStatus};
use crate::events::{CacheEvent, Listener, ListenerRegistry, Subscription};
use crate::freshness::CacheConfig;
use crate::key::QueryKey;

/// Boxed future produced by a query function.
pub type QueryFuture = BoxFuture<'static, ApiResult<Value>>;

/// Function that loads the data for one key. Stored on the entry so the
/// cache can refetch on invalidation or polling without the caller.
pub type QueryFn = Arc<dyn Fn() -> QueryFuture + Send + Sync>;

/// Future shared by every caller waiting on the same in-flight fetch.
pub type SharedFetch = Shared<QueryFuture>;

/// Wrap a typed async loader into a [`QueryFn`].
pub fn query_fn<F, Fut, T>(load: F) -> QueryFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
    T: Serialize,
{
    Arc::new(move || {
        let fut = load();
        async move {
            let value = fut.await?;
            serde_json::to_value(value).map_err(|e| ApiError::decode(e.to_string()))
        }
        .boxed()
    })
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from fresh cached data.
    pub hits: u64,
    /// Reads that had to fetch.
    pub misses: u64,
    /// Fetch tasks started.
    pub fetches: u64,
    /// Fetch triggers folded into an already running fetch.
    pub deduplicated: u64,
    /// Fetch results dropped because the entry moved on.
    pub discarded: u64,
    /// Entries removed by garbage collection.
    pub evictions: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct InFlight {
    generation: u64,
    future: SharedFetch,
    abort: AbortHandle,
    previous_status: QueryStatus,
}

/// Source of record epochs. A record keeps its epoch for as long as it
/// exists; a key that is removed and created again gets a new one.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

struct Record {
    epoch: u64,
    data: Option<Value>,
    status: QueryStatus,
    error: Option<ApiError>,
    data_updated_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    query_fn: Option<QueryFn>,
    observers: usize,
    unobserved_since: Option<Instant>,
}

impl Record {
    fn new(now: Instant) -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            data: None,
            status: QueryStatus::Idle,
            error: None,
            data_updated_at: None,
            invalidated: false,
            generation: 0,
            in_flight: None,
            query_fn: None,
            observers: 0,
            unobserved_since: Some(now),
        }
    }

    fn snapshot(&self, key: &QueryKey) -> QueryEntry {
        QueryEntry {
            key: key.clone(),
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            data_updated_at: self.data_updated_at,
            is_invalidated: self.invalidated,
            is_fetching: self.in_flight.is_some(),
            observers: self.observers,
        }
    }

    /// Abort the in-flight fetch, if any, and put the status back to what it
    /// was before the fetch started.
    fn cancel(&mut self, key: &QueryKey) -> Option<CacheEvent> {
        let in_flight = self.in_flight.take()?;
        in_flight.abort.abort();
        let previous = self.status;
        self.status = in_flight.previous_status;
        Some(CacheEvent::Transition {
            key: key.clone(),
            previous,
            status: self.status,
            error: None,
        })
    }

    /// Forget data and error but keep observers and the query function.
    fn reset(&mut self, key: &QueryKey) -> Option<CacheEvent> {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.abort();
        }
        self.data = None;
        self.error = None;
        self.data_updated_at = None;
        self.invalidated = false;
        let previous = self.status;
        self.status = QueryStatus::Idle;
        (previous != QueryStatus::Idle).then(|| CacheEvent::Transition {
            key: key.clone(),
            previous,
            status: QueryStatus::Idle,
            error: None,
        })
    }
}

#[derive(Default)]
struct State {
    records: HashMap<QueryKey, Record>,
    stats: CacheStats,
}

struct Inner {
    config: CacheConfig,
    state: Mutex<State>,
    listeners: Arc<ListenerRegistry>,
}

/// Entry of the cache as captured before an optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    pub(crate) key: QueryKey,
    pub(crate) data: Value,
    pub(crate) data_updated_at: Option<Instant>,
}

/// Key-addressed store of query results.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                listeners: Arc::new(ListenerRegistry::default()),
            }),
        }
    }

    /// Create a cache with the default 30 s / 5 min windows.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Handle that does not keep the cache alive. Listeners registered on
    /// the cache hold one of these to avoid a reference cycle.
    pub fn downgrade(&self) -> WeakQueryCache {
        WeakQueryCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_all(&self, events: Vec<CacheEvent>) {
        for event in &events {
            self.inner.listeners.emit(event);
        }
    }

    // ========================================================================
    // READS AND WRITES
    // ========================================================================

    /// Last known entry for `key`, even while a refetch is in flight.
    pub fn read(&self, key: &QueryKey) -> Option<QueryEntry> {
        self.lock()
            .records
            .get(key)
            .map(|record| record.snapshot(key))
    }

    /// Typed view of the cached data for `key`.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        self.read(key).and_then(|entry| entry.data_as())
    }

    /// Snapshots of every entry whose key starts with `prefix`.
    pub fn snapshot(&self, prefix: &QueryKey) -> Vec<QueryEntry> {
        let state = self.lock();
        let mut entries: Vec<QueryEntry> = state
            .records
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, record)| record.snapshot(key))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Replace the data for `key` with `updater(current)`.
    ///
    /// The update happens under the store lock, so no reader sees a partial
    /// result. The write counts as fresh data for the staleness window.
    ///
    /// Status is left as it is, with one exception: an entry that has never
    /// loaded (`Idle`, which includes a key that did not exist yet) moves to
    /// `Success` and subscribers see that transition. A `Loading` or `Error`
    /// entry keeps its status.
    pub fn write<F>(&self, key: &QueryKey, updater: F)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let event = {
            let mut guard = self.lock();
            let now = Instant::now();
            let record = guard
                .records
                .entry(key.clone())
                .or_insert_with(|| Record::new(now));
            let next = updater(record.data.as_ref());
            record.data = Some(next);
            record.data_updated_at = Some(now);
            record.invalidated = false;
            if record.status == QueryStatus::Idle {
                record.status = QueryStatus::Success;
                Some(CacheEvent::Transition {
                    key: key.clone(),
                    previous: QueryStatus::Idle,
                    status: QueryStatus::Success,
                    error: None,
                })
            } else {
                None
            }
        };
        trace!(key = %key, "Cache write");
        if let Some(event) = event {
            self.inner.listeners.emit(&event);
        }
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, value: &T) -> ApiResult<()> {
        let value = serde_json::to_value(value).map_err(|e| ApiError::decode(e.to_string()))?;
        self.write(key, move |_| value);
        Ok(())
    }

    /// Apply `transform` to the data of every entry under `prefix` that holds
    /// data, returning what each entry looked like before. Snapshot and
    /// write happen under one lock acquisition.
    pub(crate) fn transform_matching<F>(&self, prefix: &QueryKey, transform: F) -> Vec<Snapshot>
    where
        F: Fn(&Value) -> Value,
    {
        let mut guard = self.lock();
        let now = Instant::now();
        let mut snapshots = Vec::new();
        for (key, record) in guard.records.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            let Some(data) = record.data.as_ref() else {
                continue;
            };
            let next = transform(data);
            snapshots.push(Snapshot {
                key: key.clone(),
                data: data.clone(),
                data_updated_at: record.data_updated_at,
            });
            record.data = Some(next);
            record.data_updated_at = Some(now);
        }
        snapshots
    }

    /// Put a captured snapshot back exactly as it was.
    pub(crate) fn restore(&self, snapshot: Snapshot) {
        let mut guard = self.lock();
        let now = Instant::now();
        let record = guard
            .records
            .entry(snapshot.key)
            .or_insert_with(|| Record::new(now));
        record.data = Some(snapshot.data);
        record.data_updated_at = snapshot.data_updated_at;
    }

    // ========================================================================
    // FETCHING
    // ========================================================================

    /// Serve fresh cached data for `key`, fetching only when the entry is
    /// missing or stale.
    pub async fn ensure(&self, key: &QueryKey, query_fn: QueryFn) -> ApiResult<Value> {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = Instant::now();
            if let Some(record) = state.records.get_mut(key) {
                if record.query_fn.is_none() {
                    record.query_fn = Some(Arc::clone(&query_fn));
                }
                let entry = record.snapshot(key);
                if !entry.is_stale(self.inner.config.stale_time, now) {
                    if let Some(data) = entry.data {
                        state.stats.hits += 1;
                        trace!(key = %key, "Cache hit");
                        return Ok(data);
                    }
                }
            }
            state.stats.misses += 1;
        }
        self.fetch(key, query_fn).await
    }

    /// Fetch `key` now, joining a fetch that is already running.
    ///
    /// If the fetch being awaited is superseded (by an invalidation that
    /// started a new one), the caller follows the new fetch. A fetch that
    /// was cancelled without replacement yields [`ApiError::Cancelled`].
    pub async fn fetch(&self, key: &QueryKey, query_fn: QueryFn) -> ApiResult<Value> {
        let mut pending = self.start_fetch(key, query_fn);
        loop {
            match pending.await {
                Err(ApiError::Cancelled) => match self.in_flight(key) {
                    Some(next) => pending = next,
                    None => return Err(ApiError::Cancelled),
                },
                other => return other,
            }
        }
    }

    /// Refetch `key` with its registered query function. Returns false when
    /// the key has never been given one.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        let query_fn = self
            .lock()
            .records
            .get(key)
            .and_then(|record| record.query_fn.clone());
        match query_fn {
            Some(query_fn) => {
                drop(self.start_fetch(key, query_fn));
                true
            }
            None => false,
        }
    }

    fn in_flight(&self, key: &QueryKey) -> Option<SharedFetch> {
        self.lock()
            .records
            .get(key)
            .and_then(|record| record.in_flight.as_ref())
            .map(|in_flight| in_flight.future.clone())
    }

    /// Start a fetch task for `key` unless one is already running.
    fn start_fetch(&self, key: &QueryKey, query_fn: QueryFn) -> SharedFetch {
        let (future, event) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = Instant::now();
            let record = state
                .records
                .entry(key.clone())
                .or_insert_with(|| Record::new(now));
            record.query_fn = Some(Arc::clone(&query_fn));

            if let Some(in_flight) = &record.in_flight {
                state.stats.deduplicated += 1;
                debug!(key = %key, "Joining in-flight fetch");
                return in_flight.future.clone();
            }

            record.generation += 1;
            let generation = record.generation;
            let cache = self.clone();
            let task_key = key.clone();
            let task: JoinHandle<ApiResult<Value>> = tokio::spawn(async move {
                let result = AssertUnwindSafe(async move { query_fn().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(ApiError::decode("query function panicked")));
                if cache.settle(&task_key, generation, &result) {
                    result
                } else {
                    Err(ApiError::Cancelled)
                }
            });
            let abort = task.abort_handle();
            let future = async move {
                match task.await {
                    Ok(result) => result,
                    Err(err) if err.is_cancelled() => Err(ApiError::Cancelled),
                    Err(err) => Err(ApiError::decode(format!("fetch task failed: {}", err))),
                }
            }
            .boxed()
            .shared();

            let previous = record.status;
            record.in_flight = Some(InFlight {
                generation,
                future: future.clone(),
                abort,
                previous_status: previous,
            });
            record.status = QueryStatus::Loading;
            state.stats.fetches += 1;
            debug!(key = %key, generation, "Fetch started");

            (
                future,
                CacheEvent::Transition {
                    key: key.clone(),
                    previous,
                    status: QueryStatus::Loading,
                    error: None,
                },
            )
        };
        self.inner.listeners.emit(&event);
        future
    }

    /// Apply a fetch result if the entry is still waiting for `generation`.
    fn settle(&self, key: &QueryKey, generation: u64, result: &ApiResult<Value>) -> bool {
        let event = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(record) = state.records.get_mut(key) else {
                state.stats.discarded += 1;
                debug!(key = %key, generation, "Discarding result for removed entry");
                return false;
            };
            match &record.in_flight {
                Some(in_flight) if in_flight.generation == generation => {}
                _ => {
                    state.stats.discarded += 1;
                    debug!(key = %key, generation, "Discarding superseded fetch result");
                    return false;
                }
            }

            record.in_flight = None;
            let previous = record.status;
            match result {
                Ok(value) => {
                    record.data = Some(value.clone());
                    record.data_updated_at = Some(Instant::now());
                    record.status = QueryStatus::Success;
                    record.error = None;
                    record.invalidated = false;
                }
                Err(error) => {
                    record.status = QueryStatus::Error;
                    record.error = Some(error.clone());
                }
            }
            CacheEvent::Transition {
                key: key.clone(),
                previous,
                status: record.status,
                error: record.error.clone(),
            }
        };
        if let Some(error) = event.error() {
            debug!(key = %key, error = %error, "Fetch failed");
        }
        self.inner.listeners.emit(&event);
        true
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Mark every entry under `prefix` stale and refetch the observed ones.
    ///
    /// In-flight fetches for those entries are dropped first so their
    /// responses cannot overwrite anything written after this call.
    /// Returns the number of entries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let (marked, events, refetch) = {
            let mut guard = self.lock();
            let mut events = Vec::new();
            let mut refetch = Vec::new();
            let mut marked = 0;
            for (key, record) in guard.records.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                marked += 1;
                record.invalidated = true;
                events.extend(record.cancel(key));
                if record.observers > 0 {
                    if let Some(query_fn) = &record.query_fn {
                        refetch.push((key.clone(), Arc::clone(query_fn)));
                    }
                }
            }
            (marked, events, refetch)
        };
        debug!(prefix = %prefix, marked, refetching = refetch.len(), "Invalidated queries");
        self.emit_all(events);
        for (key, query_fn) in refetch {
            drop(self.start_fetch(&key, query_fn));
        }
        marked
    }

    /// Cancel in-flight fetches under `prefix` without refetching. Entries
    /// return to the status they had before the fetch started.
    pub fn cancel(&self, prefix: &QueryKey) -> usize {
        let events: Vec<CacheEvent> = {
            let mut guard = self.lock();
            guard
                .records
                .iter_mut()
                .filter(|(key, _)| key.starts_with(prefix))
                .filter_map(|(key, record)| record.cancel(key))
                .collect()
        };
        let cancelled = events.len();
        if cancelled > 0 {
            debug!(prefix = %prefix, cancelled, "Cancelled in-flight fetches");
        }
        self.emit_all(events);
        cancelled
    }

    /// Drop every entry under `prefix`, aborting their fetches.
    ///
    /// Entries that still have observers are not dropped. They go back to
    /// `Idle` with no data or error, keeping their observer count and query
    /// function, so polling and invalidation keep refetching them. Returns
    /// the number of entries dropped.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let (removed, reset, events) = {
            let mut guard = self.lock();
            let before = guard.records.len();
            let mut events = Vec::new();
            let mut reset = 0;
            guard.records.retain(|key, record| {
                if !key.starts_with(prefix) {
                    return true;
                }
                if record.observers == 0 {
                    if let Some(in_flight) = record.in_flight.take() {
                        in_flight.abort.abort();
                    }
                    return false;
                }
                reset += 1;
                events.extend(record.reset(key));
                true
            });
            (before - guard.records.len(), reset, events)
        };
        if reset > 0 {
            debug!(prefix = %prefix, reset, "Reset observed entries");
        }
        self.emit_all(events);
        removed
    }

    /// Drop every entry. Observed entries are emptied instead, as in
    /// [`remove`](Self::remove).
    pub fn clear(&self) -> usize {
        let removed = self.remove(&QueryKey::default());
        debug!(removed, "Cache cleared");
        removed
    }

    // ========================================================================
    // OBSERVERS AND GARBAGE COLLECTION
    // ========================================================================

    /// Register a consumer of `key`. While any guard is alive the entry is
    /// refetched on invalidation and never garbage collected.
    pub fn observe(&self, key: &QueryKey, query_fn: Option<QueryFn>) -> ObserverGuard {
        let mut guard = self.lock();
        let now = Instant::now();
        let record = guard
            .records
            .entry(key.clone())
            .or_insert_with(|| Record::new(now));
        record.observers += 1;
        record.unobserved_since = None;
        if let Some(query_fn) = query_fn {
            record.query_fn = Some(query_fn);
        }
        ObserverGuard {
            cache: Arc::downgrade(&self.inner),
            key: key.clone(),
            epoch: record.epoch,
        }
    }

    /// Evict entries that have had no observer for `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;
        let before = state.records.len();
        state.records.retain(|_, record| {
            let expired = record.observers == 0
                && record.in_flight.is_none()
                && record
                    .unobserved_since
                    .map(|since| now.saturating_duration_since(since) >= gc_time)
                    .unwrap_or(false);
            !expired
        });
        let evicted = before - state.records.len();
        state.stats.evictions += evicted as u64;
        if evicted > 0 {
            debug!(evicted, "Garbage collected cache entries");
        }
        evicted
    }

    /// Run [`collect_garbage`](Self::collect_garbage) every `interval` until
    /// the cache is dropped or the handle aborted.
    pub fn spawn_gc_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                QueryCache { inner }.collect_garbage();
            }
        })
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Invoke `listener` for every entry transition and reported mutation
    /// failure until the returned handle is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.add(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Publish a failed write against `key` to subscribers.
    pub fn report_mutation_error(&self, key: &QueryKey, error: &ApiError) {
        let event = CacheEvent::MutationFailed {
            key: key.clone(),
            error: error.clone(),
        };
        self.inner.listeners.emit(&event);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut stats = state.stats.clone();
        stats.entry_count = state.records.len() as u64;
        stats
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`QueryCache`].
#[derive(Clone)]
pub struct WeakQueryCache {
    inner: Weak<Inner>,
}

impl WeakQueryCache {
    pub fn upgrade(&self) -> Option<QueryCache> {
        self.inner.upgrade().map(|inner| QueryCache { inner })
    }
}

/// Keeps an entry observed. Dropping the last guard for a key starts its
/// garbage-collection clock.
#[must_use = "the entry is only observed while the guard is alive"]
pub struct ObserverGuard {
    cache: Weak<Inner>,
    key: QueryKey,
    epoch: u64,
}

impl ObserverGuard {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let Some(inner) = self.cache.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A record created after this guard's record went away is not ours.
        if let Some(record) = state
            .records
            .get_mut(&self.key)
            .filter(|record| record.epoch == self.epoch)
        {
            record.observers = record.observers.saturating_sub(1);
            if record.observers == 0 {
                record.unobserved_since = Some(Instant::now());
            }
        }
    }
}
