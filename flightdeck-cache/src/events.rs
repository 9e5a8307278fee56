//! Transition events and listener registration.

use flightdeck_core::ApiError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::entry::QueryStatus;
use crate::key::QueryKey;

/// Something observable happened to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// An entry moved from one status to another.
    Transition {
        key: QueryKey,
        previous: QueryStatus,
        status: QueryStatus,
        error: Option<ApiError>,
    },
    /// A write operation targeting `key` failed. Mutations do not live in
    /// the cache, but their failures are published on the same stream so a
    /// single observer can react to both.
    MutationFailed { key: QueryKey, error: ApiError },
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Transition { key, .. } | CacheEvent::MutationFailed { key, .. } => key,
        }
    }

    /// The error carried by a transition into `Error` or a failed mutation.
    pub fn error(&self) -> Option<&ApiError> {
        match self {
            CacheEvent::Transition {
                status: QueryStatus::Error,
                error,
                ..
            } => error.as_ref(),
            CacheEvent::Transition { .. } => None,
            CacheEvent::MutationFailed { error, .. } => Some(error),
        }
    }
}

/// Callback invoked for every [`CacheEvent`].
pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn add(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` once to every listener registered at call time.
    ///
    /// Listeners run outside the registry lock, so they may subscribe,
    /// unsubscribe, or call back into the cache.
    pub(crate) fn emit(&self, event: &CacheEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Handle returned by `QueryCache::subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Deregister the listener. Returns false if it was already gone.
    pub fn unsubscribe(mut self) -> bool {
        let removed = self.detach();
        self.registry = Weak::new();
        removed
    }

    fn detach(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.remove(self.id))
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
