//! Request timing middleware.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Middleware, Next, RequestContext};
use crate::error::Result;
use crate::ratelimit::{classify_operation, Operation};

/// Aggregate timings for one operation category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationTiming {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl OperationTiming {
    fn first(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    /// Mean duration across recorded requests.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / self.count as u32
    }
}

/// Measures request durations and warns about slow requests.
///
/// Timings are keyed by operation category, so the map holds at most one
/// entry per [`Operation`] whatever names clients send.
pub struct TimingMiddleware {
    slow_threshold: Duration,
    timings: DashMap<Operation, OperationTiming>,
}

impl TimingMiddleware {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            timings: DashMap::new(),
        }
    }

    /// Timings for one operation category.
    pub fn timing(&self, operation: Operation) -> Option<OperationTiming> {
        self.timings.get(&operation).map(|t| *t)
    }

    /// Every recorded category and its timings, in category order.
    pub fn snapshot(&self) -> Vec<(Operation, OperationTiming)> {
        let mut timings: Vec<_> = self.timings.iter().map(|e| (*e.key(), *e.value())).collect();
        timings.sort_by_key(|(op, _)| *op);
        timings
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value> {
        let target = ctx.target().to_string();
        let operation = classify_operation(&target);
        let request_id = ctx.request_id.clone();
        let start = Instant::now();

        let result = next.run(ctx).await;

        let elapsed = start.elapsed();
        self.timings
            .entry(operation)
            .and_modify(|t| t.record(elapsed))
            .or_insert_with(|| OperationTiming::first(elapsed));

        if elapsed >= self.slow_threshold {
            warn!(
                request_id = %request_id,
                target = %target,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow request"
            );
        } else {
            debug!(
                request_id = %request_id,
                target = %target,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request timed"
            );
        }

        result
    }
}
