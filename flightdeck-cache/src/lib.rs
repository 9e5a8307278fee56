//! FLIGHTDECK Cache - Key-addressed query cache
//!
//! In-memory store of server query results with:
//! - Tuple keys addressed by prefix for invalidation
//! - Freshness window and garbage collection of unobserved entries
//! - De-duplicated, cancellable background fetches
//! - Transition events for global observers
//! - Optimistic writes with exact revert

pub mod entry;
pub mod events;
pub mod freshness;
pub mod key;
pub mod optimistic;
pub mod store;

pub use entry::{QueryEntry, QueryStatus};
pub use events::{CacheEvent, Listener, Subscription};
pub use freshness::{CacheConfig, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
pub use key::{KeyPart, QueryKey};
pub use optimistic::RevertToken;
pub use store::{
    query_fn, CacheStats, ObserverGuard, QueryCache, QueryFn, QueryFuture, SharedFetch, WeakQueryCache,
};
