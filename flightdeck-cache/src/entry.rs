//! Query entries and their status.

use flightdeck_core::ApiError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::key::QueryKey;

/// Status of a query entry.
///
/// `Loading` is entered on every fetch, including background refetches of an
/// entry that already holds data; the data stays readable meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            QueryStatus::Idle => "idle",
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        };
        f.write_str(value)
    }
}

/// Read-only snapshot of one cache entry.
///
/// Snapshots are clones; mutating one has no effect on the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry {
    pub key: QueryKey,
    pub data: Option<Value>,
    pub status: QueryStatus,
    pub error: Option<ApiError>,
    /// When `data` was last written, by a fetch or by `write`.
    pub data_updated_at: Option<Instant>,
    /// Set by `invalidate`, cleared by the next successful fetch or write.
    pub is_invalidated: bool,
    pub is_fetching: bool,
    /// Number of live observers (mounted consumers).
    pub observers: usize,
}

impl QueryEntry {
    /// Stale when never loaded, explicitly invalidated, or older than
    /// `stale_time`.
    pub fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        if self.is_invalidated {
            return true;
        }
        match self.data_updated_at {
            Some(updated_at) if self.data.is_some() => {
                now.saturating_duration_since(updated_at) >= stale_time
            }
            _ => true,
        }
    }

    /// Deserialize the cached data into `T`.
    ///
    /// Returns `None` when there is no data or it does not have the shape of
    /// `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;
    use serde_json::json;

    fn entry(data: Option<Value>, updated_at: Option<Instant>) -> QueryEntry {
        QueryEntry {
            key: query_key!["alerts"],
            data,
            status: QueryStatus::Success,
            error: None,
            data_updated_at: updated_at,
            is_invalidated: false,
            is_fetching: false,
            observers: 0,
        }
    }

    #[test]
    fn test_entry_without_data_is_stale() {
        let now = Instant::now();
        assert!(entry(None, Some(now)).is_stale(Duration::from_secs(30), now));
    }

    #[test]
    fn test_entry_staleness_window() {
        let now = Instant::now();
        let e = entry(Some(json!([])), Some(now));
        assert!(!e.is_stale(Duration::from_secs(30), now + Duration::from_secs(29)));
        assert!(e.is_stale(Duration::from_secs(30), now + Duration::from_secs(30)));
    }

    #[test]
    fn test_invalidated_entry_is_stale() {
        let now = Instant::now();
        let mut e = entry(Some(json!([])), Some(now));
        e.is_invalidated = true;
        assert!(e.is_stale(Duration::from_secs(30), now));
    }

    #[test]
    fn test_data_as() {
        let e = entry(Some(json!([1, 2, 3])), Some(Instant::now()));
        assert_eq!(e.data_as::<Vec<u32>>(), Some(vec![1, 2, 3]));
        assert_eq!(e.data_as::<String>(), None);
    }
}
