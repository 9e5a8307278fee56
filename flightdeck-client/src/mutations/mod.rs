//! Write operations.
//!
//! Each operation runs `idle -> pending -> success | error`, observable
//! through its [`MutationTracker`]. Operations never return an error to
//! their caller: failures are turned into a toast and a terminal
//! [`MutationState::Error`], and reported to the cache's event stream so the
//! global error observer can handle auth failures once.

pub mod alerts;
pub mod analyses;

use crate::api_client::FleetApi;
use crate::messages::{self, Resource};
use crate::notifications::Notifier;
use flightdeck_cache::{QueryCache, QueryKey};
use flightdeck_core::ApiError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub use alerts::{AlertStatusMutation, AlertTransition};
pub use analyses::{CreateAnalysisMutation, DeleteAnalysisMutation};

#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T = ()> {
    Idle,
    Pending,
    Success(T),
    Error(ApiError),
}

impl<T> MutationState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, MutationState::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MutationState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MutationState::Error(_))
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            MutationState::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// Observable state of one write operation.
#[derive(Debug)]
pub struct MutationTracker<T> {
    state: watch::Sender<MutationState<T>>,
}

impl<T: Clone> MutationTracker<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(MutationState::Idle);
        Self { state }
    }

    pub fn state(&self) -> MutationState<T> {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState<T>> {
        self.state.subscribe()
    }

    pub fn reset(&self) {
        self.state.send_replace(MutationState::Idle);
    }

    pub(crate) fn start(&self) {
        self.state.send_replace(MutationState::Pending);
    }

    pub(crate) fn finish(&self, state: MutationState<T>) -> MutationState<T> {
        self.state.send_replace(state.clone());
        state
    }
}

impl<T: Clone> Default for MutationTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators shared by every write operation.
#[derive(Clone)]
pub(crate) struct MutationContext {
    pub(crate) cache: QueryCache,
    pub(crate) api: Arc<dyn FleetApi>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl MutationContext {
    /// Publish the failure and show the local toast for it, if any.
    pub(crate) fn fail(
        &self,
        key: &QueryKey,
        resource: Resource,
        error: &ApiError,
        fallback: &str,
    ) {
        debug!(key = %key, error = %error, "Mutation failed");
        self.cache.report_mutation_error(key, error);
        if let Some(toast) = messages::mutation_failure(resource, error, fallback) {
            self.notifier.notify(toast);
        }
    }
}

/// Entry point for the write hooks.
#[derive(Clone)]
pub struct Mutations {
    ctx: MutationContext,
}

impl Mutations {
    pub fn new(cache: QueryCache, api: Arc<dyn FleetApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ctx: MutationContext {
                cache,
                api,
                notifier,
            },
        }
    }

    pub fn acknowledge_alert(&self) -> AlertStatusMutation {
        AlertStatusMutation::new(self.ctx.clone(), AlertTransition::Acknowledge)
    }

    pub fn resolve_alert(&self) -> AlertStatusMutation {
        AlertStatusMutation::new(self.ctx.clone(), AlertTransition::Resolve)
    }

    pub fn create_analysis(&self) -> CreateAnalysisMutation {
        CreateAnalysisMutation::new(self.ctx.clone())
    }

    pub fn delete_analysis(&self) -> DeleteAnalysisMutation {
        DeleteAnalysisMutation::new(self.ctx.clone())
    }
}
