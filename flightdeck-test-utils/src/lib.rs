//! Flightdeck Test Utilities
//!
//! Shared test infrastructure for the Flightdeck workspace:
//! - An in-memory fleet backend with call counters and scripted failures
//! - Recording notifier and navigator
//! - Proptest generators for alerts and analyses
//! - Fixtures for common scenarios

pub use flightdeck_core::{
    Alert, AlertId, AlertSeverity, AlertStats, AlertStatus, Analysis, AnalysisId,
    AnalysisStatus, ApiError, ApiResult, CreateAnalysisRequest, Timestamp,
};

use async_trait::async_trait;
use flightdeck_client::api_client::FleetApi;
use flightdeck_client::nav::Navigator;
use flightdeck_client::notifications::{Notifier, Toast};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK BACKEND
// ============================================================================

/// Backend operation, used to count calls and script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetAlerts,
    GetAlertStats,
    AcknowledgeAlert,
    ResolveAlert,
    GetAnalyses,
    GetAnalysis,
    CreateAnalysis,
    DeleteAnalysis,
}

#[derive(Default)]
struct MockState {
    alerts: Vec<Alert>,
    analyses: Vec<Analysis>,
    next_analysis: u64,
    calls: HashMap<Endpoint, usize>,
    scripted: HashMap<Endpoint, VecDeque<ApiError>>,
    always: HashMap<Endpoint, ApiError>,
}

/// In-memory fleet backend.
///
/// Acknowledge and resolve change the stored alert, so a refetch after a
/// successful write returns the new status.
#[derive(Default)]
pub struct MockFleetApi {
    state: Mutex<MockState>,
    delay: Duration,
}

impl MockFleetApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alerts(self, alerts: Vec<Alert>) -> Self {
        self.lock().alerts = alerts;
        self
    }

    pub fn with_analyses(self, analyses: Vec<Analysis>) -> Self {
        self.lock().analyses = analyses;
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next call to `endpoint` with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        self.lock()
            .scripted
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Fail every call to `endpoint` until [`succeed`](Self::succeed).
    pub fn fail_always(&self, endpoint: Endpoint, error: ApiError) {
        self.lock().always.insert(endpoint, error);
    }

    pub fn succeed(&self, endpoint: Endpoint) {
        let mut state = self.lock();
        state.always.remove(&endpoint);
        state.scripted.remove(&endpoint);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Server-side view of the alerts.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    pub fn analyses(&self) -> Vec<Analysis> {
        self.lock().analyses.clone()
    }

    async fn enter(&self, endpoint: Endpoint) -> ApiResult<()> {
        let failure = {
            let mut state = self.lock();
            *state.calls.entry(endpoint).or_insert(0) += 1;
            let scripted = state
                .scripted
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front);
            scripted.or_else(|| state.always.get(&endpoint).cloned())
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn set_alert_status(&self, id: &AlertId, status: AlertStatus) -> ApiResult<()> {
        let mut state = self.lock();
        let alert = state
            .alerts
            .iter_mut()
            .find(|alert| &alert.id == id)
            .ok_or_else(|| ApiError::http(404, "Alert not found"))?;
        let now = chrono::Utc::now();
        alert.status = status;
        match status {
            AlertStatus::Acknowledged => alert.acknowledged_at = Some(now),
            AlertStatus::Resolved => alert.resolved_at = Some(now),
            AlertStatus::Open => {}
        }
        Ok(())
    }
}

#[async_trait]
impl FleetApi for MockFleetApi {
    async fn get_alerts(&self, skip: u32, limit: u32) -> ApiResult<Vec<Alert>> {
        self.enter(Endpoint::GetAlerts).await?;
        Ok(self
            .lock()
            .alerts
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_alert_stats(&self) -> ApiResult<AlertStats> {
        self.enter(Endpoint::GetAlertStats).await?;
        Ok(fixtures::stats_for(&self.lock().alerts))
    }

    async fn acknowledge_alert(&self, id: &AlertId) -> ApiResult<()> {
        self.enter(Endpoint::AcknowledgeAlert).await?;
        self.set_alert_status(id, AlertStatus::Acknowledged)
    }

    async fn resolve_alert(&self, id: &AlertId) -> ApiResult<()> {
        self.enter(Endpoint::ResolveAlert).await?;
        self.set_alert_status(id, AlertStatus::Resolved)
    }

    async fn get_analyses(&self, skip: u32, limit: u32) -> ApiResult<Vec<Analysis>> {
        self.enter(Endpoint::GetAnalyses).await?;
        Ok(self
            .lock()
            .analyses
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_analysis(&self, id: &AnalysisId) -> ApiResult<Analysis> {
        self.enter(Endpoint::GetAnalysis).await?;
        self.lock()
            .analyses
            .iter()
            .find(|analysis| &analysis.id == id)
            .cloned()
            .ok_or_else(|| ApiError::http(404, "Analysis not found"))
    }

    async fn create_analysis(&self, request: &CreateAnalysisRequest) -> ApiResult<Analysis> {
        self.enter(Endpoint::CreateAnalysis).await?;
        let mut state = self.lock();
        state.next_analysis += 1;
        let mut analysis = fixtures::analysis(
            &format!("an-new-{}", state.next_analysis),
            AnalysisStatus::Pending,
        );
        analysis.aircraft_id = Some(request.aircraft_id.clone());
        analysis.file_name = Some(request.file_name.clone());
        state.analyses.insert(0, analysis.clone());
        Ok(analysis)
    }

    async fn delete_analysis(&self, id: &AnalysisId) -> ApiResult<()> {
        self.enter(Endpoint::DeleteAnalysis).await?;
        let mut state = self.lock();
        let before = state.analyses.len();
        state.analyses.retain(|analysis| &analysis.id != id);
        if state.analyses.len() == before {
            return Err(ApiError::http(404, "Analysis not found"));
        }
        Ok(())
    }
}

// ============================================================================
// RECORDING COLLABORATORS
// ============================================================================

/// Notifier that keeps every toast.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.toasts().into_iter().map(|toast| toast.title).collect()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.toasts()
            .iter()
            .filter(|toast| toast.title == title)
            .count()
    }

    pub fn clear(&self) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

/// Navigator that counts login redirects.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    logins: AtomicUsize,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_redirects(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn go_to_login(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Flightdeck records.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_alert_status() -> impl Strategy<Value = AlertStatus> {
        prop_oneof![
            Just(AlertStatus::Open),
            Just(AlertStatus::Acknowledged),
            Just(AlertStatus::Resolved),
        ]
    }

    pub fn arb_alert_severity() -> impl Strategy<Value = AlertSeverity> {
        prop_oneof![
            Just(AlertSeverity::Info),
            Just(AlertSeverity::Warning),
            Just(AlertSeverity::Critical),
        ]
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_alert() -> impl Strategy<Value = Alert> {
        (
            "[a-z0-9]{1,8}",
            arb_alert_status(),
            arb_alert_severity(),
            "[A-Za-z ]{0,24}",
            proptest::option::of(arb_timestamp()),
        )
            .prop_map(|(id, status, severity, title, created_at)| {
                let mut alert = fixtures::alert(&id, status);
                alert.severity = severity;
                alert.title = title;
                alert.created_at = created_at;
                alert
            })
    }

    /// Alerts with distinct ids.
    pub fn arb_alert_list(max: usize) -> impl Strategy<Value = Vec<Alert>> {
        proptest::collection::vec(arb_alert(), 0..=max).prop_map(|alerts| {
            let mut seen = std::collections::HashSet::new();
            alerts
                .into_iter()
                .filter(|alert| seen.insert(alert.id.clone()))
                .collect()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    pub fn alert(id: &str, status: AlertStatus) -> Alert {
        Alert {
            id: AlertId::new(id),
            status,
            severity: AlertSeverity::Warning,
            title: format!("Alert {}", id),
            message: "Battery temperature above threshold".to_string(),
            aircraft_id: Some("N123FD".to_string()),
            analysis_id: None,
            created_at: None,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn open_alerts(ids: &[&str]) -> Vec<Alert> {
        ids.iter().map(|id| alert(id, AlertStatus::Open)).collect()
    }

    pub fn analysis(id: &str, status: AnalysisStatus) -> Analysis {
        Analysis {
            id: AnalysisId::new(id),
            status,
            aircraft_id: Some("N123FD".to_string()),
            file_name: Some(format!("{}.bin", id)),
            summary: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn create_request() -> CreateAnalysisRequest {
        CreateAnalysisRequest {
            aircraft_id: "N123FD".to_string(),
            file_name: "flight-0412.bin".to_string(),
            notes: None,
        }
    }

    /// Totals as the backend would compute them for `alerts`.
    pub fn stats_for(alerts: &[Alert]) -> AlertStats {
        let mut stats = AlertStats {
            total: alerts.len() as u64,
            ..Default::default()
        };
        let mut by_severity = BTreeMap::new();
        for alert in alerts {
            match alert.status {
                AlertStatus::Open => stats.open += 1,
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                AlertStatus::Resolved => stats.resolved += 1,
            }
            let severity = serde_json::to_value(alert.severity)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *by_severity.entry(severity).or_insert(0) += 1;
        }
        stats.by_severity = by_severity;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scripted_failures_are_consumed_in_order() {
        let api = MockFleetApi::new().with_alerts(fixtures::open_alerts(&["a1"]));
        api.fail_next(Endpoint::GetAlerts, ApiError::http(500, "first"));

        assert_eq!(
            api.get_alerts(0, 10).await.unwrap_err().status(),
            Some(500)
        );
        assert_eq!(api.get_alerts(0, 10).await.unwrap().len(), 1);
        assert_eq!(api.calls(Endpoint::GetAlerts), 2);
    }

    #[tokio::test]
    async fn test_mock_acknowledge_updates_server_state() {
        let api = MockFleetApi::new().with_alerts(fixtures::open_alerts(&["a1", "a2"]));
        api.acknowledge_alert(&AlertId::new("a1")).await.unwrap();

        let alerts = api.alerts();
        assert_eq!(alerts[0].status, AlertStatus::Acknowledged);
        assert!(alerts[0].acknowledged_at.is_some());
        assert_eq!(alerts[1].status, AlertStatus::Open);

        let missing = api.acknowledge_alert(&AlertId::new("zz")).await;
        assert_eq!(missing.unwrap_err().status(), Some(404));
    }

    #[test]
    fn test_stats_for() {
        let mut alerts = fixtures::open_alerts(&["a", "b"]);
        alerts.push(fixtures::alert("c", AlertStatus::Resolved));
        let stats = fixtures::stats_for(&alerts);
        assert_eq!((stats.total, stats.open, stats.resolved), (3, 2, 1));
        assert_eq!(stats.by_severity.get("warning"), Some(&3));
    }
}
