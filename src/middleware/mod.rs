//! Request middleware chain.
//!
//! A [`Pipeline`] runs a request through an ordered list of [`Middleware`]
//! stages before it reaches the endpoint [`Handler`]. Each stage receives a
//! [`Next`] continuation for the rest of the chain and may short-circuit by
//! returning an error instead of calling it.

mod circuit_breaker;
mod context;
mod error_handling;
mod logging;
mod rate_limit;
mod retry;
mod timing;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitState};
pub use context::{RequestContext, TransportInfo};
pub use error_handling::ErrorHandlingMiddleware;
pub use logging::LoggingMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use retry::{RetryConfig, RetryMiddleware};
pub use timing::{OperationTiming, TimingMiddleware};

/// The end of a middleware chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: RequestContext) -> Result<Value>;
}

/// One stage of the request chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Process a request, usually by calling `next.run(ctx)`.
    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value>;
}

/// The remainder of a middleware chain.
///
/// `Next` is `Copy`, so a stage may run the rest of the chain more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the remaining stages and the endpoint.
    pub async fn run(self, ctx: RequestContext) -> Result<Value> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                };
                current.handle(ctx, next).await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}

/// An endpoint wrapped in middleware, outermost stage first.
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Handler>,
}

impl Pipeline {
    pub fn new(endpoint: Arc<dyn Handler>) -> Self {
        Self {
            middleware: Vec::new(),
            endpoint,
        }
    }

    /// Append a stage. Stages run in the order they are added.
    pub fn layer(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Names of the configured stages, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Run a request through every stage and the endpoint.
    pub async fn handle(&self, ctx: RequestContext) -> Result<Value> {
        let next = Next {
            middleware: &self.middleware,
            endpoint: self.endpoint.as_ref(),
        };
        next.run(ctx).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::FiregateError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Endpoint that replays scripted results and counts calls.
    pub struct ScriptedHandler {
        results: Mutex<VecDeque<Result<Value>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedHandler {
        pub fn new(results: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Handler for ScriptedHandler {
        async fn call(&self, _ctx: RequestContext) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Value::Bool(true)))
        }
    }

    pub fn transient() -> FiregateError {
        FiregateError::Upstream {
            status: Some(503),
            message: "service unavailable".to_string(),
            retryable: true,
        }
    }
}
