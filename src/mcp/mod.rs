//! MCP server exposing the Firecrawl tools.

mod firecrawl;
mod protocol;
mod server;
mod service;
mod tools;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use firecrawl::{FirecrawlApi, HttpFirecrawlApi};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use server::{McpServer, STDIO_SOURCE};
pub use service::{McpService, PipelineStats, STATS_RESOURCE_URI, STATUS_RESOURCE_URI};
pub use tools::{definitions, Tool, ToolDefinition};

use crate::config::FiregateConfig;
use crate::error::Result;
use crate::middleware::{
    CircuitBreakerMiddleware, ErrorHandlingMiddleware, LoggingMiddleware, Pipeline,
    RateLimitMiddleware, RetryMiddleware, TimingMiddleware,
};
use crate::ratelimit::{RateLimitAlgorithm, RateLimitBackend, RateLimiter, SlidingWindowLimiter};

/// Build the limiter selected by the configuration.
pub fn build_limiter(config: &FiregateConfig) -> Result<Arc<dyn RateLimitBackend>> {
    let limiter: Arc<dyn RateLimitBackend> = match config.algorithm {
        RateLimitAlgorithm::TokenBucket => Arc::new(RateLimiter::new(config.rate_limiting.clone())?),
        RateLimitAlgorithm::SlidingWindow => Arc::new(
            SlidingWindowLimiter::new(config.sliding_window.clone())?
                .with_enabled(config.rate_limiting.enabled),
        ),
    };
    info!(
        algorithm = ?config.algorithm,
        enabled = config.rate_limiting.enabled,
        "Rate limiter initialized"
    );
    Ok(limiter)
}

/// Wrap the MCP service in the standard middleware chain:
/// logging, timing, error handling, rate limit, retry, circuit breaker.
pub fn build_pipeline(
    config: &FiregateConfig,
    api: Arc<dyn FirecrawlApi>,
    limiter: Arc<dyn RateLimitBackend>,
) -> Pipeline {
    let logging = &config.logging;
    let stats = PipelineStats {
        timing: Arc::new(TimingMiddleware::new(Duration::from_millis(
            logging.slow_request_ms,
        ))),
        errors: Arc::new(ErrorHandlingMiddleware::new(
            logging.expose_internal_errors,
        )),
    };
    let service = Arc::new(McpService::new(api, limiter.clone()).with_stats(stats.clone()));

    Pipeline::new(service)
        .layer(Arc::new(LoggingMiddleware::new(logging.log_payloads)))
        .layer(stats.timing)
        .layer(stats.errors)
        .layer(Arc::new(RateLimitMiddleware::new(limiter)))
        .layer(Arc::new(RetryMiddleware::new(config.retry.clone())))
        .layer(Arc::new(CircuitBreakerMiddleware::new(&config.circuit_breaker)))
}

/// Build a ready-to-serve server from configuration.
pub fn build_server(config: &FiregateConfig, api: Arc<dyn FirecrawlApi>) -> Result<McpServer> {
    let limiter = build_limiter(config)?;
    Ok(McpServer::new(build_pipeline(config, api, limiter)))
}
