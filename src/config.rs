//! Process configuration read from the environment

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_VERSION: &str = "v60.0";
const DEFAULT_SCHEMA_OBJECT_LIMIT: usize = 100;
const DEFAULT_PICKLIST_OBJECT_LIMIT: usize = 50;
const DEFAULT_PROGRESS_POLL_MS: u64 = 500;
const DEFAULT_STOP_GRACE_MS: u64 = 3000;
const DEFAULT_REGISTRY_LINGER_MS: u64 = 60_000;
const DEFAULT_SCAN_RETENTION: usize = 3;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Limits applied by the collectors to a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub schema_objects: usize,
    pub picklist_objects: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            schema_objects: DEFAULT_SCHEMA_OBJECT_LIMIT,
            picklist_objects: DEFAULT_PICKLIST_OBJECT_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub api_version: String,
    pub limits: ScanLimits,
    pub progress_poll: Duration,
    pub stop_grace: Duration,
    /// How long a finished scan stays attachable when nobody consumes its stream.
    pub registry_linger: Duration,
    pub scan_retention: usize,
    pub data_dir: PathBuf,
    pub log_level: tracing::Level,
    pub http_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_version: DEFAULT_API_VERSION.to_string(),
            limits: ScanLimits::default(),
            progress_poll: Duration::from_millis(DEFAULT_PROGRESS_POLL_MS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            registry_linger: Duration::from_millis(DEFAULT_REGISTRY_LINGER_MS),
            scan_retention: DEFAULT_SCAN_RETENTION,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_level: tracing::Level::INFO,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Build the config from process environment variables.
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Only the log level, so logging can start before the rest is parsed.
    pub fn log_level_from_env() -> tracing::Level {
        log_level(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", default_bind_addr()),
            api_version: lookup("SF_API_VERSION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            limits: ScanLimits {
                schema_objects: parse_or(&lookup, "SCHEMA_OBJECT_LIMIT", DEFAULT_SCHEMA_OBJECT_LIMIT),
                picklist_objects: parse_or(&lookup, "PICKLIST_OBJECT_LIMIT", DEFAULT_PICKLIST_OBJECT_LIMIT),
            },
            progress_poll: Duration::from_millis(parse_or(&lookup, "PROGRESS_POLL_MS", DEFAULT_PROGRESS_POLL_MS).max(1)),
            stop_grace: Duration::from_millis(parse_or(&lookup, "STOP_GRACE_MS", DEFAULT_STOP_GRACE_MS)),
            registry_linger: Duration::from_millis(parse_or(&lookup, "REGISTRY_LINGER_MS", DEFAULT_REGISTRY_LINGER_MS)),
            scan_retention: parse_or(&lookup, "SCAN_RETENTION", DEFAULT_SCAN_RETENTION),
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            log_level: log_level(&lookup),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)),
        }
    }
}

fn log_level<F>(lookup: &F) -> tracing::Level
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, "LOG_LEVEL", tracing::Level::INFO)
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid config value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.api_version, "v60.0");
        assert_eq!(config.limits, ScanLimits::default());
        assert_eq!(config.progress_poll, Duration::from_millis(500));
        assert_eq!(config.stop_grace, Duration::from_millis(3000));
        assert_eq!(config.registry_linger, Duration::from_secs(60));
        assert_eq!(config.scan_retention, 3);
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.bind_addr.port(), 3000);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("SF_API_VERSION", "v61.0"),
            ("SCHEMA_OBJECT_LIMIT", "10"),
            ("PROGRESS_POLL_MS", "50"),
            ("LOG_LEVEL", "debug"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]);
        assert_eq!(config.api_version, "v61.0");
        assert_eq!(config.limits.schema_objects, 10);
        assert_eq!(config.limits.picklist_objects, 50);
        assert_eq!(config.progress_poll, Duration::from_millis(50));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = config_from(&[("SCAN_RETENTION", "many"), ("PROGRESS_POLL_MS", "0")]);
        assert_eq!(config.scan_retention, 3);
        assert_eq!(config.progress_poll, Duration::from_millis(1));
    }

    #[test]
    fn log_level_is_read_on_its_own() {
        let vars: HashMap<&str, &str> = [("LOG_LEVEL", "warn"), ("SCAN_RETENTION", "many")].into();
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());
        assert_eq!(log_level(&lookup), tracing::Level::WARN);

        let unset = |_: &str| -> Option<String> { None };
        assert_eq!(log_level(&unset), tracing::Level::INFO);
        let garbage = |_: &str| Some("loud".to_string());
        assert_eq!(log_level(&garbage), tracing::Level::INFO);
    }
}
