//! Optimistic writes with revert.
//!
//! An optimistic write is cancel, snapshot and transform applied to every
//! cached entry under a prefix. The returned [`RevertToken`] either commits
//! (the server agreed) or puts each entry back exactly as it was.

use serde_json::Value;
use tracing::debug;

use crate::key::QueryKey;
use crate::store::{QueryCache, Snapshot};

/// Cancel fetches under `prefix`, then apply `transform` to every entry
/// under it that holds data.
///
/// Cancelling first keeps an in-flight refetch from landing on top of the
/// optimistic data. Entries without data are left alone and are not part of
/// the revert.
pub fn apply<F>(cache: &QueryCache, prefix: &QueryKey, transform: F) -> RevertToken
where
    F: Fn(&Value) -> Value,
{
    cache.cancel(prefix);
    let snapshots = cache.transform_matching(prefix, transform);
    debug!(prefix = %prefix, entries = snapshots.len(), "Applied optimistic update");
    RevertToken { snapshots }
}

/// Pre-write state of the entries touched by [`apply`].
#[must_use = "an optimistic update must be committed or reverted"]
#[derive(Debug)]
pub struct RevertToken {
    snapshots: Vec<Snapshot>,
}

impl RevertToken {
    /// Keys whose data was replaced.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.snapshots.iter().map(|snapshot| &snapshot.key)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Keep the optimistic data.
    pub fn commit(self) {}

    /// Restore every touched entry to its captured data and timestamp.
    pub fn revert(self, cache: &QueryCache) {
        let restored = self.snapshots.len();
        for snapshot in self.snapshots {
            cache.restore(snapshot);
        }
        debug!(restored, "Reverted optimistic update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;
    use serde_json::json;
    use std::time::Duration;

    fn bump(value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| json!(item.as_i64().unwrap_or(0) + 1))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_transforms_every_page() {
        let cache = QueryCache::with_defaults();
        cache.write(&query_key!["alerts", 0, 2], |_| json!([1, 2]));
        cache.write(&query_key!["alerts", 2, 2], |_| json!([3]));
        cache.write(&query_key!["analyses", 0, 2], |_| json!([9]));

        let token = apply(&cache, &query_key!["alerts"], bump);

        assert_eq!(token.keys().count(), 2);
        assert_eq!(cache.read(&query_key!["alerts", 0, 2]).unwrap().data, Some(json!([2, 3])));
        assert_eq!(cache.read(&query_key!["alerts", 2, 2]).unwrap().data, Some(json!([4])));
        assert_eq!(cache.read(&query_key!["analyses", 0, 2]).unwrap().data, Some(json!([9])));
        token.commit();
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_restores_data_and_timestamp() {
        let cache = QueryCache::with_defaults();
        let key = query_key!["alerts", 0, 2];
        cache.write(&key, |_| json!([1, 2]));
        let before = cache.read(&key).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let token = apply(&cache, &query_key!["alerts"], bump);
        assert_ne!(cache.read(&key).unwrap().data_updated_at, before.data_updated_at);

        token.revert(&cache);
        let after = cache.read(&key).unwrap();
        assert_eq!(after.data, before.data);
        assert_eq!(after.data_updated_at, before.data_updated_at);
    }

    #[tokio::test]
    async fn test_apply_without_cached_data_is_empty() {
        let cache = QueryCache::with_defaults();
        let token = apply(&cache, &query_key!["alerts"], bump);
        assert!(token.is_empty());
        token.revert(&cache);
        assert!(cache.snapshot(&query_key!["alerts"]).is_empty());
    }
}
