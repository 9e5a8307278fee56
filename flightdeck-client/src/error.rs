//! Error types for the client binary.

use crate::config::ConfigError;
use crate::persistence::PersistenceError;
use flightdeck_core::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
    #[error("Usage: {0}")]
    Usage(String),
}
