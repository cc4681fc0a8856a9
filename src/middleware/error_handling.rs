//! Error handling middleware.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{Middleware, Next, RequestContext};
use crate::error::{FiregateError, Result};

/// Logs failures at a level matching their kind, counts them, and hides
/// internal details from clients unless configured otherwise.
#[derive(Debug, Default)]
pub struct ErrorHandlingMiddleware {
    expose_internal: bool,
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl ErrorHandlingMiddleware {
    pub fn new(expose_internal: bool) -> Self {
        Self {
            expose_internal,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Number of failures seen per error kind.
    pub fn error_counts(&self) -> HashMap<&'static str, u64> {
        self.counts.lock().clone()
    }

    fn sanitize(&self, err: FiregateError) -> FiregateError {
        if self.expose_internal {
            return err;
        }
        match err {
            FiregateError::Io(_) | FiregateError::Config(_) => {
                FiregateError::Internal("internal server error".to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Middleware for ErrorHandlingMiddleware {
    fn name(&self) -> &'static str {
        "error_handling"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value> {
        let request_id = ctx.request_id.clone();
        let target = ctx.target().to_string();

        let err = match next.run(ctx).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        *self.counts.lock().entry(err.kind()).or_insert(0) += 1;

        match &err {
            FiregateError::RateLimited(_) | FiregateError::CircuitOpen { .. } => {
                info!(request_id = %request_id, target = %target, error = %err, "Request rejected");
            }
            FiregateError::InvalidParams(_)
            | FiregateError::MethodNotFound(_)
            | FiregateError::UnknownTool(_)
            | FiregateError::Json(_) => {
                warn!(request_id = %request_id, target = %target, error = %err, "Invalid request");
            }
            _ => {
                error!(request_id = %request_id, target = %target, error = %err, "Request error");
            }
        }

        Err(self.sanitize(err))
    }
}
