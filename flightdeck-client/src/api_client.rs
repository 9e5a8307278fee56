//! API client layer for the fleet telemetry REST backend.

use crate::config::{ConfigError, FlightdeckConfig};
use crate::error::ClientError;
use crate::persistence::CredentialStore;
use async_trait::async_trait;
use flightdeck_core::{
    Alert, AlertId, AlertStats, Analysis, AnalysisId, ApiError, ApiResult, CreateAnalysisRequest,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Operations the synchronization layer needs from the backend.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn get_alerts(&self, skip: u32, limit: u32) -> ApiResult<Vec<Alert>>;
    async fn get_alert_stats(&self) -> ApiResult<AlertStats>;
    async fn acknowledge_alert(&self, id: &AlertId) -> ApiResult<()>;
    async fn resolve_alert(&self, id: &AlertId) -> ApiResult<()>;
    async fn get_analyses(&self, skip: u32, limit: u32) -> ApiResult<Vec<Analysis>>;
    async fn get_analysis(&self, id: &AnalysisId) -> ApiResult<Analysis>;
    async fn create_analysis(&self, request: &CreateAnalysisRequest) -> ApiResult<Analysis>;
    async fn delete_analysis(&self, id: &AnalysisId) -> ApiResult<()>;
}

/// Error payload returned by the backend. Validation errors put a list in
/// `detail`, everything else a string.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl RestClient {
    pub fn new(
        config: &FlightdeckConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.api_base_url.trim()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "api_base_url",
                reason: e.to_string(),
            }
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must be a base URL".to_string(),
            }
            .into());
        }
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` with `segments` appended, each percent-encoded, so an id
    /// can never change the route.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn page_url(&self, resource: &str, skip: u32, limit: u32) -> Url {
        let mut url = self.url(&["api", "v1", resource]);
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match self.credentials.token() {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(err) => {
                warn!(error = %err, "Failed to read stored credential");
                request
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = error_message(status, &text);
        debug!(status = status.as_u16(), message = %message, "Request failed");
        Err(ApiError::http(status.as_u16(), message))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let response = self.send(self.request(Method::GET, url)).await?;
        response.json::<T>().await.map_err(transport_error)
    }
}

#[async_trait]
impl FleetApi for RestClient {
    async fn get_alerts(&self, skip: u32, limit: u32) -> ApiResult<Vec<Alert>> {
        self.get_json(self.page_url("alerts", skip, limit)).await
    }

    async fn get_alert_stats(&self) -> ApiResult<AlertStats> {
        self.get_json(self.url(&["api", "v1", "alerts", "stats"]))
            .await
    }

    async fn acknowledge_alert(&self, id: &AlertId) -> ApiResult<()> {
        let url = self.url(&["api", "v1", "alerts", id.as_str(), "acknowledge"]);
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn resolve_alert(&self, id: &AlertId) -> ApiResult<()> {
        let url = self.url(&["api", "v1", "alerts", id.as_str(), "resolve"]);
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn get_analyses(&self, skip: u32, limit: u32) -> ApiResult<Vec<Analysis>> {
        self.get_json(self.page_url("analyses", skip, limit)).await
    }

    async fn get_analysis(&self, id: &AnalysisId) -> ApiResult<Analysis> {
        self.get_json(self.url(&["api", "v1", "analyses", id.as_str()]))
            .await
    }

    async fn create_analysis(&self, request: &CreateAnalysisRequest) -> ApiResult<Analysis> {
        let response = self
            .send(
                self.request(Method::POST, self.url(&["api", "v1", "analyses"]))
                    .json(request),
            )
            .await?;
        response.json::<Analysis>().await.map_err(transport_error)
    }

    async fn delete_analysis(&self, id: &AnalysisId) -> ApiResult<()> {
        let url = self.url(&["api", "v1", "analyses", id.as_str()]);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::decode(err.to_string())
    } else if err.is_timeout() {
        ApiError::network(format!("Request timed out: {}", err))
    } else if err.is_connect() {
        ApiError::network(format!("Connection failed: {}", err))
    } else if let Some(status) = err.status() {
        ApiError::http(status.as_u16(), err.to_string())
    } else {
        ApiError::network(format!("Network error: {}", err))
    }
}

/// Pick the most useful message out of an error response body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => return detail,
            Some(serde_json::Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
        if let Some(message) = parsed.message.filter(|m| !m.trim().is_empty()) {
            return message;
        }
    }
    let body = body.trim();
    if !body.is_empty() && body.len() <= 200 && !body.starts_with('<') {
        return body.to_string();
    }
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown status")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, LogConfig};
    use crate::persistence::MemoryCredentialStore;

    fn client(base_url: &str) -> Result<RestClient, ClientError> {
        let config = FlightdeckConfig {
            api_base_url: base_url.to_string(),
            request_timeout_ms: 5_000,
            credential_path: "tmp/credentials.json".into(),
            cache: CacheSettings {
                stale_time_ms: 30_000,
                gc_time_ms: 300_000,
                poll_interval_ms: 30_000,
                gc_sweep_interval_ms: 60_000,
            },
            log: LogConfig {
                filter: "info".to_string(),
                json: false,
            },
        };
        RestClient::new(&config, Arc::new(MemoryCredentialStore::new()))
    }

    #[test]
    fn test_ids_are_encoded_as_one_segment() {
        let client = client("http://localhost:8000").unwrap();
        let url = client.url(&["api", "v1", "alerts", "a/b?c#d", "acknowledge"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/v1/alerts/a%2Fb%3Fc%23d/acknowledge"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_urls_keep_base_path_prefix() {
        let client = client("https://fleet.example.com/backend/").unwrap();
        assert_eq!(
            client.url(&["api", "v1", "analyses", "an-1"]).as_str(),
            "https://fleet.example.com/backend/api/v1/analyses/an-1"
        );
        assert_eq!(
            client.page_url("alerts", 50, 25).as_str(),
            "https://fleet.example.com/backend/api/v1/alerts?skip=50&limit=25"
        );
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        assert!(matches!(
            client("not a url"),
            Err(ClientError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_error_message_prefers_detail() {
        let body = r#"{"detail": "Alert not found", "message": "ignored"}"#;
        assert_eq!(error_message(StatusCode::NOT_FOUND, body), "Alert not found");
    }

    #[test]
    fn test_error_message_falls_back_to_message() {
        let body = r#"{"message": "Service warming up"}"#;
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, body),
            "Service warming up"
        );
    }

    #[test]
    fn test_error_message_serializes_structured_detail() {
        let body = r#"{"detail": [{"loc": ["body", "file_name"], "msg": "field required"}]}"#;
        assert!(error_message(StatusCode::UNPROCESSABLE_ENTITY, body).contains("field required"));
    }

    #[test]
    fn test_error_message_without_body() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502: Bad Gateway"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>proxy</html>"),
            "HTTP 502: Bad Gateway"
        );
    }
}
