//! Rate limiter trait for abstracting the token-bucket and sliding-window limiters.

use serde_json::Value;

use super::rejection::RateLimitExceeded;
use crate::middleware::RequestContext;

/// Trait for rate limiter implementations.
///
/// Checks are synchronous: implementations hold their lock only for the
/// duration of the call and never suspend.
pub trait RateLimitBackend: Send + Sync {
    /// Admit the request or report which limit it exceeded.
    fn check(&self, ctx: &RequestContext) -> Result<(), RateLimitExceeded>;

    /// JSON snapshot of the limiter state, optionally including one client.
    fn status(&self, client_id: Option<&str>) -> Value;

    /// Forget all state held for a client.
    fn reset_client(&self, client_id: &str);
}
