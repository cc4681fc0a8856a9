//! Sliding-window rate limiter keyed by client and operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, trace};

use super::backend::RateLimitBackend;
use super::identity::{DefaultIdentifier, RequestIdentifier};
use super::operation::Operation;
use super::rejection::{RateLimitExceeded, RateLimitScope};
use super::rules::SlidingWindowConfig;
use super::status::{CounterStatus, SlidingWindowStatus};
use super::window::SlidingWindow;
use crate::error::Result;
use crate::middleware::RequestContext;

/// A rate limiter that counts exact admissions per client and operation.
///
/// Unlike [`RateLimiter`](super::RateLimiter) there is no global scope, no
/// minute/hour split and no burst allowance.
pub struct SlidingWindowLimiter {
    config: SlidingWindowConfig,
    /// A disabled limiter admits everything and records nothing
    enabled: bool,
    identifier: Arc<dyn RequestIdentifier>,
    /// client id -> operation -> window
    windows: Mutex<HashMap<String, HashMap<Operation, SlidingWindow>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: SlidingWindowConfig) -> Result<Self> {
        Self::with_identifier(config, Arc::new(DefaultIdentifier))
    }

    pub fn with_identifier(
        config: SlidingWindowConfig,
        identifier: Arc<dyn RequestIdentifier>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            enabled: true,
            identifier,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Turn enforcement on or off, following the shared `rate_limiting.enabled` switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve the caller and operation for a request, then check its window.
    pub fn check(&self, ctx: &RequestContext) -> std::result::Result<(), RateLimitExceeded> {
        let client_id = self.identifier.resolve_client_id(ctx);
        let operation = self.identifier.resolve_operation(ctx);
        self.check_client(&client_id, operation)
    }

    /// Record one request for a client and operation if the window has room.
    pub fn check_client(
        &self,
        client_id: &str,
        operation: Operation,
    ) -> std::result::Result<(), RateLimitExceeded> {
        if !self.enabled {
            return Ok(());
        }

        trace!(client_id = %client_id, operation = %operation, "Checking sliding window");

        let mut windows = self.windows.lock();
        let window = windows
            .entry(client_id.to_string())
            .or_default()
            .entry(operation)
            .or_insert_with(|| {
                let (capacity, length) = self.config.window_for(operation);
                debug!(
                    client_id = %client_id,
                    operation = %operation,
                    capacity,
                    window_secs = length.as_secs(),
                    "Creating new sliding window"
                );
                SlidingWindow::new(capacity, length)
            });

        if window.add_request() {
            return Ok(());
        }

        debug!(client_id = %client_id, operation = %operation, "Sliding window limit exceeded");
        Err(RateLimitExceeded {
            scope: RateLimitScope::Window { operation },
            retry_after: window.time_until_available(),
            details: None,
        })
    }

    /// Snapshot one client's windows.
    pub fn status(&self, client_id: Option<&str>) -> SlidingWindowStatus {
        let windows = self.windows.lock();
        let client = client_id.map(|id| {
            windows
                .get(id)
                .map(|ops| {
                    ops.iter()
                        .map(|(operation, window)| {
                            let status = CounterStatus::new(
                                window.capacity() as f64,
                                window.remaining() as f64,
                                window.time_until_available(),
                            );
                            (operation.to_string(), status)
                        })
                        .collect()
                })
                .unwrap_or_else(BTreeMap::new)
        });
        SlidingWindowStatus {
            enabled: self.enabled,
            client,
        }
    }

    /// Drop every window belonging to a client.
    pub fn reset_client(&self, client_id: &str) {
        let removed = self.windows.lock().remove(client_id);
        info!(
            client_id = %client_id,
            windows = removed.map(|w| w.len()).unwrap_or(0),
            "Sliding windows reset for client"
        );
    }
}

impl RateLimitBackend for SlidingWindowLimiter {
    fn check(&self, ctx: &RequestContext) -> std::result::Result<(), RateLimitExceeded> {
        SlidingWindowLimiter::check(self, ctx)
    }

    fn status(&self, client_id: Option<&str>) -> Value {
        serde_json::to_value(SlidingWindowLimiter::status(self, client_id)).unwrap_or(Value::Null)
    }

    fn reset_client(&self, client_id: &str) {
        SlidingWindowLimiter::reset_client(self, client_id)
    }
}
