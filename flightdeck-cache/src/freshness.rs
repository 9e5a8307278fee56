//! Freshness and retention policy for cached queries.

use std::time::Duration;

/// Default window during which a successful result is served without a
/// network call.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

/// Default time an unobserved entry survives before eviction.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Configuration for the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which a successful entry is considered stale.
    pub stale_time: Duration,
    /// How long an entry with no observers is kept before eviction.
    pub gc_time: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness window.
    pub fn with_stale_time(mut self, duration: Duration) -> Self {
        self.stale_time = duration;
        self
    }

    /// Set the garbage-collection window.
    pub fn with_gc_time(mut self, duration: Duration) -> Self {
        self.gc_time = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.stale_time, Duration::from_secs(30));
        assert_eq!(config.gc_time, Duration::from_secs(300));
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_stale_time(Duration::from_secs(5))
            .with_gc_time(Duration::from_secs(60));

        assert_eq!(config.stale_time, Duration::from_secs(5));
        assert_eq!(config.gc_time, Duration::from_secs(60));
    }
}
