//! Cache keys for the fleet backend's resources.
//!
//! Lists are keyed by their pagination window under a family prefix, so
//! invalidating the family covers every page.

use flightdeck_cache::{query_key, QueryKey};
use flightdeck_core::AnalysisId;

pub const ALERTS: &str = "alerts";
pub const ALERT_STATS: &str = "alerts-stats";
pub const ANALYSES: &str = "analyses";

pub fn alerts() -> QueryKey {
    query_key![ALERTS]
}

pub fn alerts_page(skip: u32, limit: u32) -> QueryKey {
    alerts().with(skip).with(limit)
}

pub fn alert_stats() -> QueryKey {
    query_key![ALERT_STATS]
}

pub fn analyses() -> QueryKey {
    query_key![ANALYSES]
}

pub fn analyses_page(skip: u32, limit: u32) -> QueryKey {
    analyses().with(skip).with(limit)
}

pub fn analysis(id: &AnalysisId) -> QueryKey {
    analyses().with("detail").with(id.as_str())
}
