//! Tracing subscriber setup for the CLI.

use crate::config::LogConfig;
use crate::error::ClientError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// filter. Logs go to stderr so command output on stdout stays parseable.
pub fn init_tracing(config: &LogConfig) -> Result<(), ClientError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ClientError::Telemetry(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| ClientError::Telemetry(format!("Failed to init subscriber: {}", e)))?;

    tracing::debug!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}
