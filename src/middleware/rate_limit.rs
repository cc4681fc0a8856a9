//! Rate limiting middleware.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Middleware, Next, RequestContext};
use crate::error::{FiregateError, Result};
use crate::ratelimit::RateLimitBackend;

/// Rejects requests that exceed a rate limit before they reach later stages.
pub struct RateLimitMiddleware<B: RateLimitBackend + ?Sized> {
    limiter: Arc<B>,
}

impl<B: RateLimitBackend + ?Sized> RateLimitMiddleware<B> {
    pub fn new(limiter: Arc<B>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<B> {
        &self.limiter
    }
}

#[async_trait]
impl<B: RateLimitBackend + ?Sized + 'static> Middleware for RateLimitMiddleware<B> {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value> {
        // The check completes before anything is awaited.
        if let Err(exceeded) = self.limiter.check(&ctx) {
            debug!(
                request_id = %ctx.request_id,
                scope = %exceeded.scope,
                retry_after_secs = exceeded.retry_after_secs(),
                "Request rate limited"
            );
            return Err(FiregateError::RateLimited(exceeded));
        }

        next.run(ctx).await
    }
}
