//! Request logging middleware.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Middleware, Next, RequestContext};
use crate::error::Result;

/// Logs the start and outcome of every request.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Include params and results in debug logs
    log_payloads: bool,
}

impl LoggingMiddleware {
    pub fn new(log_payloads: bool) -> Self {
        Self { log_payloads }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value> {
        let request_id = ctx.request_id.clone();
        let method = ctx.method.clone();
        let tool = ctx.tool_name.clone().unwrap_or_default();

        info!(request_id = %request_id, method = %method, tool = %tool, "Processing request");
        if self.log_payloads {
            debug!(request_id = %request_id, params = %ctx.params, "Request params");
        }

        let result = next.run(ctx).await;

        match &result {
            Ok(value) => {
                info!(request_id = %request_id, method = %method, tool = %tool, "Request completed");
                if self.log_payloads {
                    debug!(request_id = %request_id, result = %value, "Request result");
                }
            }
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    method = %method,
                    tool = %tool,
                    error = %e,
                    "Request failed"
                );
            }
        }

        result
    }
}
