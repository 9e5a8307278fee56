//! Application bootstrap.
//!
//! Owns the one `QueryCache` for the process and everything registered on
//! it: the global error observer and the garbage-collection sweeper.

use crate::api_client::{FleetApi, RestClient};
use crate::config::{CacheSettings, FlightdeckConfig};
use crate::error::ClientError;
use crate::error_observer::ErrorObserver;
use crate::mutations::Mutations;
use crate::nav::{Navigator, Router};
use crate::notifications::{Notifier, TracingNotifier};
use crate::persistence::{CredentialStore, FileCredentialStore, PersistenceError};
use crate::queries::{Queries, Visibility};
use flightdeck_cache::QueryCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// External collaborators the application is wired to.
#[derive(Clone)]
pub struct AppServices {
    pub api: Arc<dyn FleetApi>,
    pub credentials: Arc<dyn CredentialStore>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
}

pub struct App {
    cache: QueryCache,
    services: AppServices,
    visibility: Visibility,
    poll_interval: Duration,
    observer: Option<ErrorObserver>,
    gc_sweeper: Option<JoinHandle<()>>,
}

impl App {
    /// Build the cache, register the error observer and start the GC
    /// sweeper. Must run inside a tokio runtime.
    pub fn start(services: AppServices, settings: &CacheSettings) -> Self {
        let cache = QueryCache::new(settings.cache_config());
        let observer = ErrorObserver::register(
            &cache,
            Arc::clone(&services.credentials),
            Arc::clone(&services.navigator),
            Arc::clone(&services.notifier),
        );
        let gc_sweeper = cache.spawn_gc_sweeper(settings.gc_sweep_interval());
        info!(
            stale_time_ms = settings.stale_time_ms,
            gc_time_ms = settings.gc_time_ms,
            "Application started"
        );
        Self {
            cache,
            services,
            visibility: Visibility::default(),
            poll_interval: settings.poll_interval(),
            observer: Some(observer),
            gc_sweeper: Some(gc_sweeper),
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &FlightdeckConfig) -> Result<Self, ClientError> {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(&config.credential_path));
        let api = RestClient::new(config, Arc::clone(&credentials))?;
        let services = AppServices {
            api: Arc::new(api),
            credentials,
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(Router::default()),
        };
        Ok(Self::start(services, &config.cache))
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn services(&self) -> &AppServices {
        &self.services
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn set_visible(&self, visible: bool) {
        self.visibility.set_visible(visible);
    }

    pub fn queries(&self) -> Queries {
        Queries::new(
            self.cache.clone(),
            Arc::clone(&self.services.api),
            self.visibility.clone(),
            self.poll_interval,
        )
    }

    pub fn mutations(&self) -> Mutations {
        Mutations::new(
            self.cache.clone(),
            Arc::clone(&self.services.api),
            Arc::clone(&self.services.notifier),
        )
    }

    /// Store a new session token and re-arm session-expiry handling.
    pub fn login(&self, token: &str) -> Result<(), PersistenceError> {
        self.services.credentials.set_token(token)?;
        if let Some(observer) = &self.observer {
            observer.reset();
        }
        info!("Session token stored");
        Ok(())
    }

    /// Clear the session token and everything cached under it.
    pub fn logout(&self) -> Result<(), PersistenceError> {
        self.services.credentials.clear()?;
        self.cache.clear();
        info!("Signed out");
        Ok(())
    }

    pub fn is_session_expired(&self) -> bool {
        self.observer
            .as_ref()
            .map(ErrorObserver::is_session_expired)
            .unwrap_or(false)
    }

    /// Resolves once a 401 has expired the session. Never resolves after
    /// shutdown has deregistered the observer.
    pub async fn session_expired(&self) {
        let Some(observer) = &self.observer else {
            return std::future::pending().await;
        };
        let mut expired = observer.session_watch();
        if expired.wait_for(|expired| *expired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Deregister the observer, stop the sweeper and drop cached data.
    pub fn shutdown(mut self) {
        self.stop();
        info!("Application stopped");
    }

    fn stop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.deregister();
        }
        if let Some(sweeper) = self.gc_sweeper.take() {
            sweeper.abort();
        }
        self.cache.clear();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop();
    }
}
