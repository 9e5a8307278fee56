//! Global handling of failed requests.
//!
//! Registered once on the cache's event stream. Every query that ends in an
//! error and every reported mutation failure passes through here. Auth
//! failures are handled for both; other failures only for queries, since
//! write operations toast their own.

use crate::messages;
use crate::nav::Navigator;
use crate::notifications::Notifier;
use crate::persistence::CredentialStore;
use flightdeck_cache::{CacheEvent, QueryCache, Subscription, WeakQueryCache};
use flightdeck_core::ErrorKind;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

struct ObserverInner {
    cache: WeakQueryCache,
    credentials: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    session_expired: watch::Sender<bool>,
}

impl ObserverInner {
    fn handle(&self, event: &CacheEvent) {
        let Some(error) = event.error() else {
            return;
        };
        let from_mutation = matches!(event, CacheEvent::MutationFailed { .. });

        match error.kind() {
            ErrorKind::Cancelled => {}
            ErrorKind::Unauthorized => self.expire_session(),
            ErrorKind::Forbidden => self.notifier.notify(messages::access_denied()),
            _ if from_mutation => {}
            _ => {
                if let Some(toast) = messages::query_failure(error) {
                    debug!(key = %event.key(), error = %error, "Query failed");
                    self.notifier.notify(toast);
                }
            }
        }
    }

    /// Drop the session: credential, cached data, then send the user to
    /// login. Runs once until re-armed.
    fn expire_session(&self) {
        if self.session_expired.send_replace(true) {
            debug!("Session expiry already handled");
            return;
        }
        warn!("Session expired, signing out");
        if let Err(err) = self.credentials.clear() {
            warn!(error = %err, "Failed to clear stored credential");
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.clear();
        }
        self.navigator.go_to_login();
        self.notifier.notify(messages::session_expired());
    }
}

/// Registration of the global error observer. Dropping it deregisters.
pub struct ErrorObserver {
    inner: Arc<ObserverInner>,
    subscription: Subscription,
}

impl ErrorObserver {
    pub fn register(
        cache: &QueryCache,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let inner = Arc::new(ObserverInner {
            cache: cache.downgrade(),
            credentials,
            navigator,
            notifier,
            session_expired: watch::Sender::new(false),
        });
        let listener = Arc::clone(&inner);
        let subscription = cache.subscribe(move |event| listener.handle(event));
        debug!("Global error observer registered");
        Self {
            inner,
            subscription,
        }
    }

    /// Whether a 401 has been handled since the last re-arm.
    pub fn is_session_expired(&self) -> bool {
        *self.inner.session_expired.borrow()
    }

    /// Receiver that flips to `true` when a 401 expires the session and back
    /// to `false` on [`reset`](Self::reset).
    pub fn session_watch(&self) -> watch::Receiver<bool> {
        self.inner.session_expired.subscribe()
    }

    /// Re-arm session-expiry handling, e.g. after a new login.
    pub fn reset(&self) {
        self.inner.session_expired.send_replace(false);
    }

    pub fn deregister(self) -> bool {
        debug!("Global error observer deregistered");
        self.subscription.unsubscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationCenter, Toast};
    use crate::persistence::MemoryCredentialStore;
    use flightdeck_cache::query_key;
    use flightdeck_core::ApiError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNavigator(AtomicUsize);

    impl Navigator for CountingNavigator {
        fn go_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        cache: QueryCache,
        credentials: Arc<MemoryCredentialStore>,
        navigator: Arc<CountingNavigator>,
        notifier: Arc<NotificationCenter>,
        observer: ErrorObserver,
    }

    fn fixture() -> Fixture {
        let cache = QueryCache::with_defaults();
        let credentials = Arc::new(MemoryCredentialStore::with_token("token"));
        let navigator = Arc::new(CountingNavigator::default());
        let notifier = Arc::new(NotificationCenter::default());
        let observer = ErrorObserver::register(
            &cache,
            credentials.clone(),
            navigator.clone(),
            notifier.clone(),
        );
        Fixture {
            cache,
            credentials,
            navigator,
            notifier,
            observer,
        }
    }

    fn titles(notifier: &NotificationCenter) -> Vec<String> {
        notifier.recent().into_iter().map(|t: Toast| t.title).collect()
    }

    #[tokio::test]
    async fn test_unauthorized_query_expires_session_once() {
        let f = fixture();
        f.cache.write(&query_key!["alerts", 0, 50], |_| json!([]));
        let failing = flightdeck_cache::query_fn(|| async {
            Err::<(), _>(ApiError::http(401, "expired"))
        });

        let _ = f.cache.fetch(&query_key!["alerts-stats"], failing.clone()).await;
        let _ = f.cache.fetch(&query_key!["analyses", 0, 20], failing).await;

        assert_eq!(f.credentials.token().unwrap(), None);
        assert!(f.cache.read(&query_key!["alerts", 0, 50]).is_none());
        assert_eq!(f.navigator.0.load(Ordering::SeqCst), 1);
        assert_eq!(titles(&f.notifier), vec![messages::SESSION_EXPIRED]);
        assert!(f.observer.is_session_expired());
        assert!(*f.observer.session_watch().borrow());

        f.observer.reset();
        assert!(!*f.observer.session_watch().borrow());
        f.cache
            .report_mutation_error(&query_key!["alerts"], &ApiError::http(401, "expired"));
        assert_eq!(f.navigator.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forbidden_and_server_errors_toast() {
        let f = fixture();
        let forbidden = flightdeck_cache::query_fn(|| async {
            Err::<(), _>(ApiError::http(403, "nope"))
        });
        let server = flightdeck_cache::query_fn(|| async {
            Err::<(), _>(ApiError::http(500, "db down"))
        });
        let missing = flightdeck_cache::query_fn(|| async {
            Err::<(), _>(ApiError::http(404, "missing"))
        });

        let _ = f.cache.fetch(&query_key!["a"], forbidden).await;
        let _ = f.cache.fetch(&query_key!["b"], server).await;
        let _ = f.cache.fetch(&query_key!["c"], missing).await;

        assert_eq!(
            titles(&f.notifier),
            vec![messages::ACCESS_DENIED, messages::SERVER_ERROR]
        );
        assert_eq!(f.navigator.0.load(Ordering::SeqCst), 0);
        assert_eq!(f.credentials.token().unwrap(), Some("token".to_string()));
    }

    #[tokio::test]
    async fn test_mutation_failures_only_handle_auth() {
        let f = fixture();
        f.cache
            .report_mutation_error(&query_key!["alerts"], &ApiError::http(500, "boom"));
        f.cache
            .report_mutation_error(&query_key!["alerts"], &ApiError::network("offline"));
        assert!(titles(&f.notifier).is_empty());

        f.cache
            .report_mutation_error(&query_key!["alerts"], &ApiError::http(403, "nope"));
        assert_eq!(titles(&f.notifier), vec![messages::ACCESS_DENIED]);
    }

    #[tokio::test]
    async fn test_deregister_stops_handling() {
        let f = fixture();
        assert_eq!(f.cache.listener_count(), 1);
        assert!(f.observer.deregister());
        assert_eq!(f.cache.listener_count(), 0);

        f.cache
            .report_mutation_error(&query_key!["alerts"], &ApiError::http(401, "expired"));
        assert_eq!(f.navigator.0.load(Ordering::SeqCst), 0);
    }
}
