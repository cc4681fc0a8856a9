//! Rate limit rules configuration.
//!
//! The token-bucket limiter and the sliding-window limiter are configured
//! independently: [`RateLimitConfig`] feeds the former, [`SlidingWindowConfig`]
//! the latter. Both are validated once and never change afterwards.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::bucket::TimeWindow;
use super::operation::Operation;
use crate::error::{FiregateError, Result};

/// Per-minute and per-hour limits for one operation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLimits {
    /// Requests allowed per minute
    pub per_minute: u32,
    /// Requests allowed per hour
    pub per_hour: u32,
}

impl OperationLimits {
    pub const fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            per_minute,
            per_hour,
        }
    }

    /// Compiled-in limits for an operation.
    pub const fn default_for(operation: Operation) -> Self {
        match operation {
            Operation::Scrape => Self::new(60, 1000),
            Operation::Crawl => Self::new(10, 100),
            Operation::Search => Self::new(30, 500),
            Operation::Extract => Self::new(20, 200),
            Operation::Map => Self::new(30, 500),
            Operation::Batch => Self::new(5, 50),
            Operation::VectorSearch => Self::new(50, 1000),
            Operation::General => Self::new(100, 2000),
        }
    }

    /// The limit for one time window.
    pub fn for_window(&self, window: TimeWindow) -> u32 {
        match window {
            TimeWindow::Minute => self.per_minute,
            TimeWindow::Hour => self.per_hour,
        }
    }
}

/// Token-bucket limits: per operation, global, and burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Master switch; a disabled limiter admits everything
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the global buckets are checked
    #[serde(default = "default_true")]
    pub global_enabled: bool,

    /// Whether operation bucket capacity is scaled by `burst_multiplier`
    #[serde(default = "default_true")]
    pub burst_enabled: bool,

    /// Global requests per minute across all clients
    #[serde(default = "default_global_per_minute")]
    pub global_per_minute: u32,

    /// Global requests per hour across all clients
    #[serde(default = "default_global_per_hour")]
    pub global_per_hour: u32,

    /// Capacity scale factor for operation buckets
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f64,

    /// Limits per operation; missing entries use compiled-in defaults
    #[serde(default = "default_operation_limits")]
    pub operations: BTreeMap<Operation, OperationLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_enabled: true,
            burst_enabled: true,
            global_per_minute: default_global_per_minute(),
            global_per_hour: default_global_per_hour(),
            burst_multiplier: default_burst_multiplier(),
            operations: default_operation_limits(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_global_per_minute() -> u32 {
    200
}

fn default_global_per_hour() -> u32 {
    5000
}

fn default_burst_multiplier() -> f64 {
    1.5
}

fn default_operation_limits() -> BTreeMap<Operation, OperationLimits> {
    Operation::ALL
        .into_iter()
        .map(|op| (op, OperationLimits::default_for(op)))
        .collect()
}

impl RateLimitConfig {
    /// Override the limits for one operation.
    pub fn with_operation(mut self, operation: Operation, per_minute: u32, per_hour: u32) -> Self {
        self.operations
            .insert(operation, OperationLimits::new(per_minute, per_hour));
        self
    }

    /// Limits for an operation, falling back to the compiled-in defaults.
    pub fn limits_for(&self, operation: Operation) -> OperationLimits {
        self.operations
            .get(&operation)
            .copied()
            .unwrap_or_else(|| OperationLimits::default_for(operation))
    }

    /// Global limit for one time window.
    pub fn global_limit(&self, window: TimeWindow) -> u32 {
        match window {
            TimeWindow::Minute => self.global_per_minute,
            TimeWindow::Hour => self.global_per_hour,
        }
    }

    /// Capacity of an operation bucket, with burst applied when enabled.
    pub fn bucket_capacity(&self, operation: Operation, window: TimeWindow) -> f64 {
        let base = self.limits_for(operation).for_window(window) as f64;
        if self.burst_enabled {
            base * self.burst_multiplier
        } else {
            base
        }
    }

    /// Check that every limit is positive and the burst multiplier is at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.global_per_minute == 0 || self.global_per_hour == 0 {
            return Err(FiregateError::Config(
                "global rate limits must be positive".to_string(),
            ));
        }

        if !self.burst_multiplier.is_finite() || self.burst_multiplier < 1.0 {
            return Err(FiregateError::Config(format!(
                "burst multiplier must be >= 1.0, got {}",
                self.burst_multiplier
            )));
        }

        for (operation, limits) in &self.operations {
            if limits.per_minute == 0 || limits.per_hour == 0 {
                return Err(FiregateError::Config(format!(
                    "rate limits for {} must be positive",
                    operation
                )));
            }
        }

        Ok(())
    }
}

/// Which limiter the server puts in front of the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    #[default]
    TokenBucket,
    SlidingWindow,
}

/// Longest sliding window accepted by validation (one week).
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;
/// Largest per-window capacity accepted by validation.
pub const MAX_WINDOW_REQUESTS: u32 = 1_000_000;

/// Capacity and window length for one operation in the sliding-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOverride {
    /// Requests allowed within the window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

/// Sliding-window limits: a shared default plus per-operation overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Requests allowed per window when no override applies
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Default window length in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Per-operation capacity and window
    #[serde(default)]
    pub overrides: HashMap<Operation, WindowOverride>,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_minutes: default_window_minutes(),
            overrides: HashMap::new(),
        }
    }
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_minutes() -> u64 {
    1
}

impl SlidingWindowConfig {
    pub fn new(max_requests: u32, window_minutes: u64) -> Self {
        Self {
            max_requests,
            window_minutes,
            overrides: HashMap::new(),
        }
    }

    /// Give one operation its own capacity and window.
    pub fn with_override(mut self, operation: Operation, max_requests: u32, window_seconds: u64) -> Self {
        self.overrides.insert(
            operation,
            WindowOverride {
                max_requests,
                window_seconds,
            },
        );
        self
    }

    /// Capacity and window for an operation.
    pub fn window_for(&self, operation: Operation) -> (u32, Duration) {
        match self.overrides.get(&operation) {
            Some(o) => (o.max_requests, Duration::from_secs(o.window_seconds)),
            None => (
                self.max_requests,
                Duration::from_secs(self.window_minutes.saturating_mul(60)),
            ),
        }
    }

    /// Check that every capacity and window is positive and within bounds.
    pub fn validate(&self) -> Result<()> {
        check_window("sliding window", self.max_requests, self.window_minutes.checked_mul(60))?;

        for (operation, o) in &self.overrides {
            check_window(
                &format!("sliding window override for {}", operation),
                o.max_requests,
                Some(o.window_seconds),
            )?;
        }

        Ok(())
    }
}

fn check_window(what: &str, max_requests: u32, window_secs: Option<u64>) -> Result<()> {
    if max_requests == 0 || window_secs == Some(0) {
        return Err(FiregateError::Config(format!("{} limits must be positive", what)));
    }
    if max_requests > MAX_WINDOW_REQUESTS {
        return Err(FiregateError::Config(format!(
            "{} allows at most {} requests per window",
            what, MAX_WINDOW_REQUESTS
        )));
    }
    match window_secs {
        Some(secs) if secs <= MAX_WINDOW_SECS => Ok(()),
        _ => Err(FiregateError::Config(format!(
            "{} window must not exceed {}s",
            what, MAX_WINDOW_SECS
        ))),
    }
}
