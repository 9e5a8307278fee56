//! Configuration loading for the Flightdeck client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use flightdeck_cache::CacheConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlightdeckConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub credential_path: PathBuf,
    pub cache: CacheSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub poll_interval_ms: u64,
    pub gc_sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FLIGHTDECK_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl FlightdeckConfig {
    /// Load from the path given by `--config` or `FLIGHTDECK_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: FlightdeckConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api_base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.credential_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "credential_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.stale_time_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.stale_time_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.gc_time_ms < self.cache.stale_time_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.gc_time_ms",
                reason: "must be >= stale_time_ms".to_string(),
            });
        }
        if self.cache.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.poll_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.gc_sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.gc_sweep_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_stale_time(Duration::from_millis(self.stale_time_ms))
            .with_gc_time(Duration::from_millis(self.gc_time_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gc_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.gc_sweep_interval_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("FLIGHTDECK_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
api_base_url = "https://fleet.example.com"
request_timeout_ms = 10000
credential_path = "/tmp/flightdeck/credentials.json"

[cache]
stale_time_ms = 30000
gc_time_ms = 300000
poll_interval_ms = 30000
gc_sweep_interval_ms = 60000

[log]
filter = "flightdeck=info"
json = false
"#;

    #[test]
    fn test_parse_sample() {
        let config = FlightdeckConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cache.cache_config(), CacheConfig::default());
        assert_eq!(config.cache.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let contents = SAMPLE.replace("[cache]", "retries = 3\n\n[cache]");
        assert!(matches!(
            FlightdeckConfig::from_toml(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_section_rejected() {
        let contents = SAMPLE.replace("[log]\nfilter = \"flightdeck=info\"\njson = false\n", "");
        assert!(FlightdeckConfig::from_toml(&contents).is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = FlightdeckConfig::from_toml(SAMPLE).unwrap();
        config.api_base_url = "ftp://fleet".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "api_base_url", .. })
        ));
    }
}
