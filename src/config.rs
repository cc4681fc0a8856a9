//! Configuration management for Firegate.
//!
//! Settings are layered: compiled-in defaults, then an optional file, then
//! environment variables prefixed with `FIREGATE__` (nested keys separated by
//! `__`), then the conventional `FIRECRAWL_API_KEY` / `FIRECRAWL_API_URL`.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FiregateError, Result};
use crate::middleware::{CircuitBreakerConfig, RetryConfig};
use crate::ratelimit::{RateLimitAlgorithm, RateLimitConfig, SlidingWindowConfig};

/// Main configuration for the Firegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiregateConfig {
    /// Firecrawl API connection
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,

    /// Limiter placed in front of the tools
    #[serde(default)]
    pub algorithm: RateLimitAlgorithm,

    /// Token-bucket rate limits
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,

    /// Sliding-window rate limits
    #[serde(default)]
    pub sliding_window: SlidingWindowConfig,

    /// Retry policy for upstream failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Logging and timing
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Firecrawl API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    /// Base URL of the Firecrawl API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.firecrawl.dev".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Log request params and results at debug level
    #[serde(default)]
    pub log_payloads: bool,

    /// Requests slower than this are logged as warnings
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,

    /// Return internal error details to clients
    #[serde(default)]
    pub expose_internal_errors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_payloads: false,
            slow_request_ms: default_slow_request_ms(),
            expose_internal_errors: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_slow_request_ms() -> u64 {
    5_000
}

impl FiregateConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: FiregateConfig = builder
            .add_source(
                Environment::with_prefix("FIREGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("firecrawl.api_key", std::env::var("FIRECRAWL_API_KEY").ok())
            .and_then(|b| {
                b.set_override_option("firecrawl.api_url", std::env::var("FIRECRAWL_API_URL").ok())
            })
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| FiregateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without consulting the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FiregateConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| FiregateError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail at request time.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()?;
        self.sliding_window.validate()?;

        if self.firecrawl.api_url.is_empty() {
            return Err(FiregateError::Config("firecrawl.api_url must not be empty".to_string()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(FiregateError::Config(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
