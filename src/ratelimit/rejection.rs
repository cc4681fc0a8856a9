//! Rate limit rejections.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use super::bucket::TimeWindow;
use super::operation::Operation;
use crate::error::round_tenths;

/// The dimension along which a limit was enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Shared across all clients
    Global(TimeWindow),
    /// One client's token bucket for one operation
    Operation {
        operation: Operation,
        window: TimeWindow,
    },
    /// One client's sliding window for one operation
    Window { operation: Operation },
}

impl RateLimitScope {
    /// Human-readable label, e.g. `global per minute` or `scrape per hour`.
    pub fn label(&self) -> String {
        match self {
            RateLimitScope::Global(window) => format!("global per {}", window),
            RateLimitScope::Operation { operation, window } => {
                format!("{} per {}", operation, window)
            }
            RateLimitScope::Window { operation } => operation.to_string(),
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Usage figures for a rejected token-bucket check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDetails {
    /// Tokens in use when the request was rejected
    pub current: f64,
    /// Bucket capacity
    pub limit: f64,
    /// Scope label
    pub scope: String,
}

/// A request rejected by a rate limit.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitExceeded {
    /// Which limit was violated
    pub scope: RateLimitScope,
    /// Estimated wait before a retry can succeed
    pub retry_after: Duration,
    /// Usage figures, present for token-bucket rejections
    pub details: Option<RateLimitDetails>,
}

impl RateLimitExceeded {
    /// Wait estimate in seconds, rounded to one decimal place.
    pub fn retry_after_secs(&self) -> f64 {
        round_tenths(self.retry_after.as_secs_f64())
    }

    /// Machine-readable form for JSON-RPC error data.
    pub fn to_json(&self) -> Value {
        let mut data = json!({
            "scope": self.scope.label(),
            "retry_after": self.retry_after_secs(),
        });
        if let Some(details) = &self.details {
            data["current"] = json!(details.current);
            data["limit"] = json!(details.limit);
        }
        data
    }
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retry = self.retry_after_secs();
        match self.scope {
            RateLimitScope::Global(window) => write!(
                f,
                "Global rate limit exceeded (per {}). Retry in {:.1}s",
                window, retry
            ),
            RateLimitScope::Operation { operation, window } => write!(
                f,
                "Rate limit exceeded for {} operations (per {}). Retry in {:.1}s",
                operation, window, retry
            ),
            RateLimitScope::Window { operation } => write!(
                f,
                "Rate limit exceeded for {} operations. Retry in {:.1}s",
                operation, retry
            ),
        }
    }
}

impl std::error::Error for RateLimitExceeded {}
