//! Analysis create and delete. These wait for the server before touching
//! the cache.

use super::{MutationContext, MutationState, MutationTracker};
use crate::messages::Resource;
use crate::notifications::Toast;
use crate::queries::keys;
use flightdeck_core::{Analysis, AnalysisId, CreateAnalysisRequest, ErrorKind};
use tokio::sync::watch;
use tracing::info;

pub struct CreateAnalysisMutation {
    ctx: MutationContext,
    tracker: MutationTracker<Analysis>,
}

impl CreateAnalysisMutation {
    pub(crate) fn new(ctx: MutationContext) -> Self {
        Self {
            ctx,
            tracker: MutationTracker::new(),
        }
    }

    pub fn state(&self) -> MutationState<Analysis> {
        self.tracker.state()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState<Analysis>> {
        self.tracker.watch()
    }

    pub async fn mutate(&self, request: &CreateAnalysisRequest) -> MutationState<Analysis> {
        self.tracker.start();
        let state = match self.ctx.api.create_analysis(request).await {
            Ok(analysis) => {
                info!(analysis_id = %analysis.id, "Analysis created");
                self.ctx.cache.invalidate(&keys::analyses());
                let toast = match analysis.file_name.as_deref() {
                    Some(file_name) => Toast::new("Analysis created")
                        .with_description(format!("Processing {}", file_name)),
                    None => Toast::new("Analysis created"),
                };
                self.ctx.notifier.notify(toast);
                MutationState::Success(analysis)
            }
            Err(error) => {
                self.ctx.fail(
                    &keys::analyses(),
                    Resource::Analysis,
                    &error,
                    "Failed to create analysis",
                );
                MutationState::Error(error)
            }
        };
        self.tracker.finish(state)
    }
}

pub struct DeleteAnalysisMutation {
    ctx: MutationContext,
    tracker: MutationTracker<()>,
}

impl DeleteAnalysisMutation {
    pub(crate) fn new(ctx: MutationContext) -> Self {
        Self {
            ctx,
            tracker: MutationTracker::new(),
        }
    }

    pub fn state(&self) -> MutationState {
        self.tracker.state()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.tracker.watch()
    }

    pub async fn mutate(&self, id: &AnalysisId) -> MutationState {
        self.tracker.start();
        let state = match self.ctx.api.delete_analysis(id).await {
            Ok(()) => {
                info!(analysis_id = %id, "Analysis deleted");
                self.ctx.cache.invalidate(&keys::analyses());
                self.ctx.notifier.notify(Toast::new("Analysis deleted"));
                MutationState::Success(())
            }
            Err(error) => {
                // Already gone on the server; drop it from the lists too.
                if error.kind() == ErrorKind::NotFound {
                    self.ctx.cache.invalidate(&keys::analyses());
                }
                self.ctx.fail(
                    &keys::analyses(),
                    Resource::Analysis,
                    &error,
                    "Failed to delete analysis",
                );
                MutationState::Error(error)
            }
        };
        self.tracker.finish(state)
    }
}
