// Configuration File Support
//
// Configuration file parsing for ratekeeper: TOML with environment variable
// overrides. Files are loaded from the XDG config directory
// (~/.config/ratekeeper/config.toml) unless a path is given.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::rate_limit::config::{
    EndpointRateLimit, LimiterSettings, DEFAULT_BURST_SIZE, DEFAULT_MAX_WAIT_MS,
    DEFAULT_REQUESTS_PER_MINUTE,
};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Limiter-wide defaults
    pub limiter: LimiterConfig,

    /// Per-endpoint limits, keyed by endpoint
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Retry policy for throttled calls
    pub retry: RetryFileConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Limiter-wide defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimiterConfig {
    /// Requests per minute for endpoints without their own entry
    pub default_requests_per_minute: u32,

    /// Burst size for endpoints without their own entry
    pub default_burst_size: u32,

    /// Cap on the single wait inside `acquire`, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            default_burst_size: DEFAULT_BURST_SIZE,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

/// One `[endpoints.<key>]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Sustained requests per minute
    pub requests_per_minute: u32,

    /// Burst size; defaults to requests_per_minute / 6
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u32>,
}

/// Retry policy as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryFileConfig {
    /// Total attempts, including the first
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,

    /// Backoff growth factor
    pub factor: f64,

    /// Jitter fraction (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryFileConfig {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            factor: defaults.factor,
            jitter: defaults.jitter,
        }
    }
}

impl RetryFileConfig {
    /// Runtime retry configuration
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .factor(self.factor)
            .jitter(self.jitter)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            limiter: LimiterConfig::default(),
            endpoints: BTreeMap::new(),
            retry: RetryFileConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// If the config file does not exist, returns default configuration
    /// (with environment overrides applied).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/ratekeeper/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "ratekeeper", "ratekeeper") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("ratekeeper")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - RATEKEEPER_LOG_LEVEL
    /// - RATEKEEPER_LOG_FORMAT
    /// - RATEKEEPER_DEFAULT_RPM
    /// - RATEKEEPER_DEFAULT_BURST
    /// - RATEKEEPER_MAX_WAIT_MS
    /// - RATEKEEPER_RETRY_MAX
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("RATEKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RATEKEEPER_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(rpm) = std::env::var("RATEKEEPER_DEFAULT_RPM") {
            if let Ok(rpm) = rpm.parse::<u32>() {
                self.limiter.default_requests_per_minute = rpm;
            }
        }
        if let Ok(burst) = std::env::var("RATEKEEPER_DEFAULT_BURST") {
            if let Ok(burst) = burst.parse::<u32>() {
                self.limiter.default_burst_size = burst;
            }
        }
        if let Ok(wait) = std::env::var("RATEKEEPER_MAX_WAIT_MS") {
            if let Ok(wait) = wait.parse::<u64>() {
                self.limiter.max_wait_ms = wait;
            }
        }

        if let Ok(retries) = std::env::var("RATEKEEPER_RETRY_MAX") {
            if let Ok(retries) = retries.parse::<u32>() {
                self.retry.max_retries = retries;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.default_limit()?;
        if self.limiter.max_wait_ms == 0 {
            anyhow::bail!("Limiter max_wait_ms must be > 0");
        }

        for (endpoint, entry) in &self.endpoints {
            if endpoint.is_empty() {
                anyhow::bail!("Endpoint keys must not be empty");
            }
            EndpointRateLimit::for_endpoint(endpoint, entry.requests_per_minute, entry.burst_size)?;
        }

        if self.retry.initial_delay_ms == 0 {
            anyhow::bail!("Retry initial_delay_ms must be > 0");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            anyhow::bail!("Retry max_delay_ms must be >= initial_delay_ms");
        }
        if self.retry.factor.is_nan() || self.retry.factor <= 1.0 {
            anyhow::bail!("Retry factor must be > 1.0, got {}", self.retry.factor);
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            anyhow::bail!("Retry jitter must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Limit for endpoints without their own entry
    pub fn default_limit(&self) -> Result<EndpointRateLimit> {
        let limit = EndpointRateLimit::new(
            self.limiter.default_requests_per_minute,
            Some(self.limiter.default_burst_size),
        )
        .context("Invalid default limiter configuration")?;
        Ok(limit)
    }

    /// Limiter settings derived from the `[limiter]` table
    pub fn limiter_settings(&self) -> Result<LimiterSettings> {
        Ok(LimiterSettings::new()
            .default_limit(self.default_limit()?)
            .max_wait(Duration::from_millis(self.limiter.max_wait_ms)))
    }

    /// Build a limiter and apply every `[endpoints.<key>]` entry
    pub async fn build_limiter(&self, clock: Arc<dyn Clock>) -> Result<RateLimiter> {
        let limiter = RateLimiter::with_clock(self.limiter_settings()?, clock);

        for (endpoint, entry) in &self.endpoints {
            limiter
                .configure(endpoint, entry.requests_per_minute, entry.burst_size)
                .await
                .with_context(|| format!("Failed to configure endpoint '{}'", endpoint))?;
        }

        Ok(limiter)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.limiter.default_requests_per_minute, 60);
        assert_eq!(config.limiter.default_burst_size, 10);
        assert_eq!(config.limiter.max_wait_ms, 60_000);
        assert!(config.endpoints.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.limiter, LimiterConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[limiter]
default_requests_per_minute = 120
default_burst_size = 20

[endpoints.gemini-quiz-gen]
requests_per_minute = 15

[endpoints.supabase-sync]
requests_per_minute = 60
burst_size = 5

[retry]
max_retries = 4
initial_delay_ms = 500
"#
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.limiter.default_requests_per_minute, 120);
        assert_eq!(config.limiter.max_wait_ms, 60_000);
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints["gemini-quiz-gen"].burst_size, None);
        assert_eq!(config.endpoints["supabase-sync"].burst_size, Some(5));
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[limiter\nbroken").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limiter.default_requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoints.insert(
            "sync".to_string(),
            EndpointConfig {
                requests_per_minute: 60,
                burst_size: Some(0),
            },
        );
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_conversion() {
        let retry = RetryFileConfig::default().to_retry_config();
        assert_eq!(retry, RetryConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.endpoints.insert(
            "gemini".to_string(),
            EndpointConfig {
                requests_per_minute: 30,
                burst_size: Some(3),
            },
        );

        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_build_limiter_applies_endpoints() {
        let mut config = Config::default();
        config.limiter.default_burst_size = 2;
        config.endpoints.insert(
            "gemini".to_string(),
            EndpointConfig {
                requests_per_minute: 60,
                burst_size: Some(1),
            },
        );

        let limiter = config
            .build_limiter(Arc::new(ManualClock::new(0)))
            .await
            .unwrap();

        assert!(limiter.try_acquire("gemini").await);
        assert!(!limiter.try_acquire("gemini").await);

        assert!(limiter.try_acquire("other").await);
        assert!(limiter.try_acquire("other").await);
        assert!(!limiter.try_acquire("other").await);
    }
}
