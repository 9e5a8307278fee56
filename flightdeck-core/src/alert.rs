//! Alert records raised by flight analyses.

use crate::identity::{AlertId, AnalysisId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an alert. Only the backend opens alerts; the client moves
/// them to `Acknowledged` or `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Field that records when the alert entered this status, if any.
    pub fn timestamp_field(&self) -> Option<&'static str> {
        match self {
            AlertStatus::Open => None,
            AlertStatus::Acknowledged => Some("acknowledged_at"),
            AlertStatus::Resolved => Some("resolved_at"),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = AlertStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(AlertStatusParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid alert status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertStatusParseError(pub String);

impl fmt::Display for AlertStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid alert status: {}", self.0)
    }
}

impl std::error::Error for AlertStatusParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// An alert as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub status: AlertStatus,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aircraft_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<AnalysisId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

/// Aggregate counters shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub open: u64,
    #[serde(default)]
    pub acknowledged: u64,
    #[serde(default)]
    pub resolved: u64,
    #[serde(default)]
    pub by_severity: BTreeMap<String, u64>,
}

/// Set `status` and its timestamp on the alert whose `id` matches, leaving
/// every other record byte-for-byte untouched.
///
/// Works on the raw JSON list so fields this crate does not model survive
/// the rewrite. A list without a matching id (or a value that is not a list)
/// comes back unchanged.
pub fn mark_alert(list: &Value, id: &AlertId, status: AlertStatus, at: Timestamp) -> Value {
    let Value::Array(items) = list else {
        return list.clone();
    };

    let items = items
        .iter()
        .map(|item| match item {
            Value::Object(record)
                if record.get("id").and_then(Value::as_str) == Some(id.as_str()) =>
            {
                let mut record = record.clone();
                record.insert("status".to_string(), Value::from(status.as_str()));
                if let Some(field) = status.timestamp_field() {
                    record.insert(field.to_string(), Value::from(at.to_rfc3339()));
                }
                Value::Object(record)
            }
            other => other.clone(),
        })
        .collect();

    Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [AlertStatus::Open, AlertStatus::Acknowledged, AlertStatus::Resolved] {
            assert_eq!(status.as_str().parse::<AlertStatus>().unwrap(), status);
        }
        assert!("closed".parse::<AlertStatus>().is_err());
    }

    #[test]
    fn test_minimal_alert_deserializes() {
        let alert: Alert = serde_json::from_value(json!({"id": "a1", "status": "open"})).unwrap();
        assert_eq!(alert.id, AlertId::new("a1"));
        assert!(alert.is_open());
        assert_eq!(alert.severity, AlertSeverity::Info);
    }

    #[test]
    fn test_mark_alert_updates_only_match() {
        let list = json!([
            {"id": "a1", "status": "open"},
            {"id": "a2", "status": "open", "custom": [1, 2]}
        ]);
        let at = Utc::now();
        let marked = mark_alert(&list, &AlertId::new("a1"), AlertStatus::Acknowledged, at);

        assert_eq!(marked[0]["status"], "acknowledged");
        assert_eq!(marked[0]["acknowledged_at"], at.to_rfc3339());
        assert_eq!(marked[1], list[1]);
    }

    #[test]
    fn test_mark_alert_resolved_sets_resolved_at() {
        let list = json!([{"id": "a1", "status": "acknowledged"}]);
        let marked = mark_alert(&list, &AlertId::new("a1"), AlertStatus::Resolved, Utc::now());
        assert_eq!(marked[0]["status"], "resolved");
        assert!(marked[0].get("resolved_at").is_some());
    }

    #[test]
    fn test_mark_alert_unknown_id_is_noop() {
        let list = json!([{"id": "a1", "status": "open"}]);
        let marked = mark_alert(&list, &AlertId::new("zz"), AlertStatus::Acknowledged, Utc::now());
        assert_eq!(marked, list);
    }

    #[test]
    fn test_mark_alert_non_list_is_noop() {
        let value = json!({"alerts": []});
        let marked = mark_alert(&value, &AlertId::new("a1"), AlertStatus::Resolved, Utc::now());
        assert_eq!(marked, value);
    }
}
