//! Optimistic alert status changes.

use super::{MutationContext, MutationState, MutationTracker};
use crate::messages::Resource;
use crate::notifications::Toast;
use crate::queries::keys;
use chrono::Utc;
use flightdeck_cache::optimistic;
use flightdeck_core::{mark_alert, AlertId, AlertStatus, ApiResult};
use tokio::sync::watch;
use tracing::info;

/// Status change applied to a single alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Acknowledge,
    Resolve,
}

impl AlertTransition {
    pub fn target(&self) -> AlertStatus {
        match self {
            AlertTransition::Acknowledge => AlertStatus::Acknowledged,
            AlertTransition::Resolve => AlertStatus::Resolved,
        }
    }

    fn success_title(&self) -> &'static str {
        match self {
            AlertTransition::Acknowledge => "Alert acknowledged",
            AlertTransition::Resolve => "Alert resolved",
        }
    }

    fn failure_fallback(&self) -> &'static str {
        match self {
            AlertTransition::Acknowledge => "Failed to acknowledge alert",
            AlertTransition::Resolve => "Failed to resolve alert",
        }
    }
}

/// Acknowledge or resolve an alert, showing the change before the server
/// confirms it.
pub struct AlertStatusMutation {
    ctx: MutationContext,
    transition: AlertTransition,
    tracker: MutationTracker<()>,
}

impl AlertStatusMutation {
    pub(crate) fn new(ctx: MutationContext, transition: AlertTransition) -> Self {
        Self {
            ctx,
            transition,
            tracker: MutationTracker::new(),
        }
    }

    pub fn transition(&self) -> AlertTransition {
        self.transition
    }

    pub fn state(&self) -> MutationState {
        self.tracker.state()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.tracker.watch()
    }

    pub fn reset(&self) {
        self.tracker.reset();
    }

    /// Every cached alerts page is updated in place, the server is asked to
    /// make the change, and the pages are restored verbatim if it refuses.
    /// Alerts and stats are invalidated once the call settles either way.
    pub async fn mutate(&self, id: &AlertId) -> MutationState {
        self.tracker.start();
        let cache = &self.ctx.cache;
        let status = self.transition.target();
        let at = Utc::now();

        let token = optimistic::apply(cache, &keys::alerts(), |list| {
            mark_alert(list, id, status, at)
        });

        let state = match self.send(id).await {
            Ok(()) => {
                token.commit();
                info!(alert_id = %id, status = %status, "Alert updated");
                self.ctx
                    .notifier
                    .notify(Toast::new(self.transition.success_title()));
                MutationState::Success(())
            }
            Err(error) => {
                token.revert(cache);
                self.ctx.fail(
                    &keys::alerts(),
                    Resource::Alert,
                    &error,
                    self.transition.failure_fallback(),
                );
                MutationState::Error(error)
            }
        };

        cache.invalidate(&keys::alerts());
        cache.invalidate(&keys::alert_stats());
        self.tracker.finish(state)
    }

    async fn send(&self, id: &AlertId) -> ApiResult<()> {
        match self.transition {
            AlertTransition::Acknowledge => self.ctx.api.acknowledge_alert(id).await,
            AlertTransition::Resolve => self.ctx.api.resolve_alert(id).await,
        }
    }
}
