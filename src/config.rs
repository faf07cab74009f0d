//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Algorithm, Quota, RateLimiter};
use crate::storage::{MemoryStorage, ShardedMemoryStorage, Storage};

/// Prefix for environment variable overrides, e.g.
/// `TURNSTILE__LIMITER__MAX_ADMISSIONS=10`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for a Turnstile limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which in-memory store backs a configured limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// One lock for all keys
    #[default]
    Memory,
    /// Per-shard locks
    Sharded,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Admission algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Maximum admissions per window
    #[serde(default = "default_max_admissions")]
    pub max_admissions: u64,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageKind,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_admissions: default_max_admissions(),
            window_seconds: default_window_seconds(),
            storage: StorageKind::default(),
        }
    }
}

fn default_max_admissions() -> u64 {
    100
}

fn default_window_seconds() -> f64 {
    60.0
}

impl LimiterSettings {
    /// The validated quota.
    pub fn quota(&self) -> Result<Quota> {
        Quota::from_secs(self.max_admissions, self.window_seconds)
    }

    /// Build a limiter with a fresh store, both reading time from `clock`.
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<RateLimiter> {
        let quota = self.quota()?;
        let storage: Arc<dyn Storage> = match self.storage {
            StorageKind::Memory => Arc::new(MemoryStorage::with_clock(clock.clone())),
            StorageKind::Sharded => Arc::new(ShardedMemoryStorage::with_clock(clock.clone())),
        };
        RateLimiter::with_clock(self.algorithm, quota, storage, clock)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration in layers: defaults, then the optional file, then
    /// `TURNSTILE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;

    /// Serializes tests that read the process environment through `load`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.limiter.algorithm, Algorithm::SlidingWindowCounter);
        assert_eq!(config.limiter.max_admissions, 100);
        assert_eq!(config.limiter.window_seconds, 60.0);
        assert_eq!(config.limiter.storage, StorageKind::Memory);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
limiter:
  algorithm: token_bucket
  max_admissions: 5
  window_seconds: 10
  storage: sharded
logging:
  level: debug
  json: true
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.algorithm, Algorithm::TokenBucket);
        assert_eq!(config.limiter.max_admissions, 5);
        assert_eq!(config.limiter.window_seconds, 10.0);
        assert_eq!(config.limiter.storage, StorageKind::Sharded);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = TurnstileConfig::from_yaml("limiter:\n  max_admissions: 7\n").unwrap();
        assert_eq!(config.limiter.max_admissions, 7);
        assert_eq!(config.limiter.window_seconds, 60.0);
        assert_eq!(config.limiter.algorithm, Algorithm::SlidingWindowCounter);
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let err = TurnstileConfig::from_yaml("limiter:\n  algorithm: leaky_bucket\n").unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_build_validates_quota() {
        let settings = LimiterSettings {
            window_seconds: 0.0,
            ..LimiterSettings::default()
        };
        let err = settings.build(Arc::new(ManualClock::new())).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_build_limiter_from_settings() {
        let settings = LimiterSettings {
            algorithm: Algorithm::FixedWindow,
            max_admissions: 2,
            window_seconds: 1.0,
            storage: StorageKind::Sharded,
        };
        let limiter = settings.build(Arc::new(ManualClock::new())).unwrap();
        assert_eq!(limiter.algorithm(), Algorithm::FixedWindow);
        assert!(limiter.allow("user").unwrap().admitted);
        assert!(limiter.allow("user").unwrap().admitted);
        assert!(!limiter.allow("user").unwrap().admitted);
    }

    #[test]
    fn test_load_from_file() {
        let _env = ENV_LOCK.lock();
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "limiter:\n  algorithm: sliding_window_log\n  max_admissions: 3\n  window_seconds: 2.5\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.algorithm, Algorithm::SlidingWindowLog);
        assert_eq!(config.limiter.max_admissions, 3);
        assert_eq!(config.limiter.window_seconds, 2.5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = TurnstileConfig::from_file("/nonexistent/turnstile.yaml").unwrap_err();
        assert!(matches!(err, TurnstileError::Io(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = ENV_LOCK.lock();
        let path = std::env::temp_dir().join(format!("turnstile-env-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  algorithm: fixed_window\n  max_admissions: 3\n").unwrap();

        std::env::set_var("TURNSTILE__LIMITER__MAX_ADMISSIONS", "42");
        std::env::set_var("TURNSTILE__LOGGING__LEVEL", "debug");
        let result = TurnstileConfig::load(Some(&path));
        std::env::remove_var("TURNSTILE__LIMITER__MAX_ADMISSIONS");
        std::env::remove_var("TURNSTILE__LOGGING__LEVEL");
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.limiter.algorithm, Algorithm::FixedWindow);
        assert_eq!(config.limiter.max_admissions, 42);
        assert_eq!(config.limiter.window_seconds, 60.0);
        assert_eq!(config.logging.level, "debug");
    }
}
