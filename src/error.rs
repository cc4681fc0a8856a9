//! Error types for the Firegate service.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::ratelimit::RateLimitExceeded;

/// JSON-RPC error code for a rate-limited request.
pub const RATE_LIMITED_CODE: i64 = -32029;
/// JSON-RPC error code for a request refused by an open circuit.
pub const CIRCUIT_OPEN_CODE: i64 = -32030;

/// Main error type for Firegate operations.
#[derive(Error, Debug)]
pub enum FiregateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit rejected the request
    #[error("{0}")]
    RateLimited(#[from] RateLimitExceeded),

    /// The circuit breaker for an operation is open
    #[error("Circuit open for {operation} operations. Retry in {:.1}s", retry_after.as_secs_f64())]
    CircuitOpen {
        operation: String,
        retry_after: Duration,
    },

    /// Request parameters failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The JSON-RPC method is not served
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The requested tool is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The Firecrawl API failed
    #[error("Firecrawl API error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else that should never reach a client verbatim
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FiregateError {
    /// Whether a retry of the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FiregateError::Upstream { retryable: true, .. })
    }

    /// Short machine-readable name, used for logging and error statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            FiregateError::Config(_) => "config",
            FiregateError::RateLimited(_) => "rate_limited",
            FiregateError::CircuitOpen { .. } => "circuit_open",
            FiregateError::InvalidParams(_) => "invalid_params",
            FiregateError::MethodNotFound(_) => "method_not_found",
            FiregateError::UnknownTool(_) => "unknown_tool",
            FiregateError::Upstream { .. } => "upstream",
            FiregateError::Json(_) => "json",
            FiregateError::Io(_) => "io",
            FiregateError::Internal(_) => "internal",
        }
    }

    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i64 {
        match self {
            FiregateError::RateLimited(_) => RATE_LIMITED_CODE,
            FiregateError::CircuitOpen { .. } => CIRCUIT_OPEN_CODE,
            FiregateError::InvalidParams(_) | FiregateError::Json(_) => -32602,
            FiregateError::MethodNotFound(_) | FiregateError::UnknownTool(_) => -32601,
            FiregateError::Config(_)
            | FiregateError::Upstream { .. }
            | FiregateError::Io(_)
            | FiregateError::Internal(_) => -32603,
        }
    }

    /// Structured error data for JSON-RPC clients, if any.
    pub fn data(&self) -> Option<Value> {
        match self {
            FiregateError::RateLimited(exceeded) => Some(exceeded.to_json()),
            FiregateError::CircuitOpen {
                operation,
                retry_after,
            } => Some(json!({
                "operation": operation,
                "retry_after": round_tenths(retry_after.as_secs_f64()),
            })),
            FiregateError::Upstream { status, .. } => status.map(|s| json!({ "status": s })),
            _ => None,
        }
    }
}

/// Round seconds to one decimal place for display.
pub(crate) fn round_tenths(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}

/// Result type alias for Firegate operations.
pub type Result<T> = std::result::Result<T, FiregateError>;
