//! Circuit breaker middleware, one breaker per operation category.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{Middleware, Next, RequestContext};
use crate::error::{FiregateError, Result};
use crate::ratelimit::{classify_operation, Operation};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before letting a trial request through
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

#[derive(Debug)]
struct Breaker {
    failures: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            failures: 0,
            opened_at: None,
        }
    }

    fn state(&self, timeout: Duration) -> CircuitState {
        match self.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= timeout => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }
}

/// Stops calling an operation after repeated upstream failures.
///
/// Closed → Open after `failure_threshold` consecutive failures; Open →
/// HalfOpen once the recovery timeout elapses; a success in HalfOpen closes
/// the circuit, a failure opens it again.
pub struct CircuitBreakerMiddleware {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: DashMap<Operation, Breaker>,
}

impl CircuitBreakerMiddleware {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            breakers: DashMap::new(),
        }
    }

    /// Current state of the breaker for an operation.
    pub fn state(&self, operation: Operation) -> CircuitState {
        self.breakers
            .get(&operation)
            .map(|b| b.state(self.recovery_timeout))
            .unwrap_or(CircuitState::Closed)
    }

    fn admit(&self, operation: Operation) -> Result<()> {
        let breaker = self.breakers.entry(operation).or_insert_with(Breaker::new);
        match (breaker.state(self.recovery_timeout), breaker.opened_at) {
            (CircuitState::Open, Some(at)) => Err(FiregateError::CircuitOpen {
                operation: operation.to_string(),
                retry_after: self.recovery_timeout.saturating_sub(at.elapsed()),
            }),
            _ => Ok(()),
        }
    }

    fn record_success(&self, operation: Operation) {
        if let Some(mut breaker) = self.breakers.get_mut(&operation) {
            if breaker.opened_at.is_some() {
                info!(operation = %operation, "Circuit closed");
            }
            breaker.failures = 0;
            breaker.opened_at = None;
        }
    }

    fn record_failure(&self, operation: Operation) {
        let mut breaker = self.breakers.entry(operation).or_insert_with(Breaker::new);
        breaker.failures += 1;

        let half_open = breaker.state(self.recovery_timeout) == CircuitState::HalfOpen;
        if half_open || breaker.failures >= self.failure_threshold {
            if breaker.opened_at.is_none() || half_open {
                warn!(operation = %operation, failures = breaker.failures, "Circuit opened");
            }
            breaker.opened_at = Some(Instant::now());
        }
    }
}

/// Failures that say something about the health of the upstream service.
fn is_service_failure(err: &FiregateError) -> bool {
    matches!(
        err,
        FiregateError::Upstream { .. } | FiregateError::Io(_) | FiregateError::Internal(_)
    )
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Value> {
        let operation = classify_operation(ctx.target());
        self.admit(operation)?;

        let result = next.run(ctx).await;
        match &result {
            Ok(_) => self.record_success(operation),
            Err(err) if is_service_failure(err) => self.record_failure(operation),
            Err(_) => {}
        }
        result
    }
}
