//! Token-bucket rate limiter with global, per-client and per-operation scopes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, trace};

use super::backend::RateLimitBackend;
use super::bucket::{TimeWindow, TokenBucket};
use super::identity::{DefaultIdentifier, RequestIdentifier};
use super::operation::Operation;
use super::rejection::{RateLimitDetails, RateLimitExceeded, RateLimitScope};
use super::rules::RateLimitConfig;
use super::status::{CounterStatus, RateLimitStatus, WindowPairStatus};
use crate::error::Result;
use crate::middleware::RequestContext;

/// Windows checked for every scope, in order.
const WINDOWS: [TimeWindow; 2] = [TimeWindow::Minute, TimeWindow::Hour];

type ClientBuckets = HashMap<(Operation, TimeWindow), TokenBucket>;

/// Everything guarded by the limiter's lock.
struct LimiterState {
    global_minute: TokenBucket,
    global_hour: TokenBucket,
    /// client id -> (operation, window) -> bucket
    clients: HashMap<String, ClientBuckets>,
}

impl LimiterState {
    fn global_mut(&mut self, window: TimeWindow) -> &mut TokenBucket {
        match window {
            TimeWindow::Minute => &mut self.global_minute,
            TimeWindow::Hour => &mut self.global_hour,
        }
    }

    fn global(&self, window: TimeWindow) -> &TokenBucket {
        match window {
            TimeWindow::Minute => &self.global_minute,
            TimeWindow::Hour => &self.global_hour,
        }
    }
}

/// The token-bucket rate limiter.
///
/// A single mutex guards all buckets so that the global and per-operation
/// checks for one request run as one atomic sequence. The lock is never held
/// across an await point.
pub struct RateLimiter {
    config: RateLimitConfig,
    identifier: Arc<dyn RequestIdentifier>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter using the default identification strategy.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_identifier(config, Arc::new(DefaultIdentifier))
    }

    /// Create a limiter with a custom identification strategy.
    ///
    /// Fails if the configuration has non-positive limits or a burst
    /// multiplier below 1.
    pub fn with_identifier(
        config: RateLimitConfig,
        identifier: Arc<dyn RequestIdentifier>,
    ) -> Result<Self> {
        config.validate()?;

        let state = LimiterState {
            global_minute: TokenBucket::for_window(config.global_per_minute as f64, TimeWindow::Minute),
            global_hour: TokenBucket::for_window(config.global_per_hour as f64, TimeWindow::Hour),
            clients: HashMap::new(),
        };

        Ok(Self {
            config,
            identifier,
            state: Mutex::new(state),
        })
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Resolve the caller and operation for a request, then check its limits.
    pub fn check(&self, ctx: &RequestContext) -> std::result::Result<(), RateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        let client_id = self.identifier.resolve_client_id(ctx);
        let operation = self.identifier.resolve_operation(ctx);
        self.check_client(&client_id, operation)
    }

    /// Check and consume one request for a client and operation.
    ///
    /// Limits are evaluated in a fixed order: global per minute, global per
    /// hour, operation per minute, operation per hour. The first failure is
    /// returned and no later bucket is touched.
    pub fn check_client(
        &self,
        client_id: &str,
        operation: Operation,
    ) -> std::result::Result<(), RateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        trace!(client_id = %client_id, operation = %operation, "Checking rate limit");

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if self.config.global_enabled {
            for window in WINDOWS {
                let bucket = state.global_mut(window);
                if !bucket.consume(1.0) {
                    let scope = RateLimitScope::Global(window);
                    debug!(client_id = %client_id, scope = %scope, "Global rate limit exceeded");
                    return Err(rejection(scope, bucket));
                }
            }
        }

        let buckets = state.clients.entry(client_id.to_string()).or_default();
        for window in WINDOWS {
            let bucket = buckets.entry((operation, window)).or_insert_with(|| {
                let capacity = self.config.bucket_capacity(operation, window);
                debug!(
                    client_id = %client_id,
                    operation = %operation,
                    window = %window,
                    capacity,
                    "Creating new token bucket"
                );
                TokenBucket::for_window(capacity, window)
            });

            if !bucket.consume(1.0) {
                let scope = RateLimitScope::Operation { operation, window };
                debug!(client_id = %client_id, scope = %scope, "Rate limit exceeded");
                return Err(rejection(scope, bucket));
            }
        }

        Ok(())
    }

    /// Snapshot the global buckets and, optionally, one client's buckets.
    ///
    /// Does not refill or otherwise mutate any bucket.
    pub fn status(&self, client_id: Option<&str>) -> RateLimitStatus {
        let state = self.state.lock();

        let global = WindowPairStatus {
            minute: counter_status(state.global(TimeWindow::Minute), TimeWindow::Minute),
            hour: counter_status(state.global(TimeWindow::Hour), TimeWindow::Hour),
        };

        let client = client_id.map(|id| {
            let mut operations: BTreeMap<String, BTreeMap<String, CounterStatus>> = BTreeMap::new();
            if let Some(buckets) = state.clients.get(id) {
                for ((operation, window), bucket) in buckets {
                    operations
                        .entry(operation.to_string())
                        .or_default()
                        .insert(window.to_string(), counter_status(bucket, *window));
                }
            }
            operations
        });

        RateLimitStatus {
            enabled: self.config.enabled,
            global,
            client,
        }
    }

    /// Drop every bucket belonging to a client. Global buckets are untouched.
    pub fn reset_client(&self, client_id: &str) {
        let removed = self.state.lock().clients.remove(client_id);
        info!(
            client_id = %client_id,
            buckets = removed.map(|b| b.len()).unwrap_or(0),
            "Rate limits reset for client"
        );
    }

    /// Number of clients with at least one bucket.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }
}

fn rejection(scope: RateLimitScope, bucket: &TokenBucket) -> RateLimitExceeded {
    RateLimitExceeded {
        scope,
        retry_after: bucket.time_until_available(1.0),
        details: Some(RateLimitDetails {
            current: (bucket.capacity() - bucket.tokens()).round(),
            limit: bucket.capacity(),
            scope: scope.label(),
        }),
    }
}

fn counter_status(bucket: &TokenBucket, window: TimeWindow) -> CounterStatus {
    CounterStatus::new(bucket.capacity(), bucket.available(), window.duration())
}

impl RateLimitBackend for RateLimiter {
    fn check(&self, ctx: &RequestContext) -> std::result::Result<(), RateLimitExceeded> {
        RateLimiter::check(self, ctx)
    }

    fn status(&self, client_id: Option<&str>) -> Value {
        serde_json::to_value(RateLimiter::status(self, client_id)).unwrap_or(Value::Null)
    }

    fn reset_client(&self, client_id: &str) {
        RateLimiter::reset_client(self, client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FiregateError;
    use crate::middleware::TransportInfo;
    use futures::future::join_all;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            burst_multiplier: 1.0,
            ..Default::default()
        }
    }

    fn scope_of(result: std::result::Result<(), RateLimitExceeded>) -> RateLimitScope {
        result.expect_err("request should be rejected").scope
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_scrape_rejected() {
        let config = RateLimitConfig {
            global_per_minute: 50,
            ..config()
        }
        .with_operation(Operation::Scrape, 10, 1000);
        let limiter = RateLimiter::new(config).unwrap();

        for i in 0..10 {
            assert!(limiter.check_client("X", Operation::Scrape).is_ok(), "request {} should pass", i);
        }

        let err = limiter.check_client("X", Operation::Scrape).unwrap_err();
        let label = err.scope.label();
        assert!(label.contains("scrape"));
        assert!(label.contains("per minute"));
        assert!(err.retry_after > Duration::ZERO);
        assert_eq!(err.details.as_ref().unwrap().limit, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_isolated() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Scrape, 2, 100)).unwrap();

        assert!(limiter.check_client("A", Operation::Scrape).is_ok());
        assert!(limiter.check_client("A", Operation::Scrape).is_ok());
        assert!(limiter.check_client("A", Operation::Scrape).is_err());

        assert!(limiter.check_client("B", Operation::Scrape).is_ok());
        assert_eq!(limiter.client_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_are_isolated() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Scrape, 1, 100)).unwrap();

        assert!(limiter.check_client("A", Operation::Scrape).is_ok());
        assert!(limiter.check_client("A", Operation::Scrape).is_err());
        assert!(limiter.check_client("A", Operation::Search).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_checked_before_operation() {
        let config = RateLimitConfig {
            global_per_minute: 1,
            ..config()
        }
        .with_operation(Operation::Scrape, 100, 1000);
        let limiter = RateLimiter::new(config).unwrap();

        assert!(limiter.check_client("A", Operation::Scrape).is_ok());
        assert_eq!(
            scope_of(limiter.check_client("B", Operation::Search)),
            RateLimitScope::Global(TimeWindow::Minute)
        );
        // The rejected request never reached B's buckets.
        assert_eq!(limiter.client_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_checked_before_hour() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Crawl, 1, 1)).unwrap();

        assert!(limiter.check_client("A", Operation::Crawl).is_ok());
        assert_eq!(
            scope_of(limiter.check_client("A", Operation::Crawl)),
            RateLimitScope::Operation {
                operation: Operation::Crawl,
                window: TimeWindow::Minute
            }
        );

        time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            scope_of(limiter.check_client("A", Operation::Crawl)),
            RateLimitScope::Operation {
                operation: Operation::Crawl,
                window: TimeWindow::Hour
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_hour_exhaustion() {
        let config = RateLimitConfig {
            global_per_minute: 10,
            global_per_hour: 2,
            ..config()
        };
        let limiter = RateLimiter::new(config).unwrap();

        assert!(limiter.check_client("A", Operation::Map).is_ok());
        assert!(limiter.check_client("B", Operation::Map).is_ok());
        assert_eq!(
            scope_of(limiter.check_client("C", Operation::Map)),
            RateLimitScope::Global(TimeWindow::Hour)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_limits_can_be_disabled() {
        let config = RateLimitConfig {
            global_per_minute: 1,
            global_enabled: false,
            ..config()
        };
        let limiter = RateLimiter::new(config).unwrap();

        for _ in 0..5 {
            assert!(limiter.check_client("A", Operation::General).is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_admits_everything() {
        let config = RateLimitConfig {
            enabled: false,
            ..config().with_operation(Operation::Batch, 1, 1)
        };
        let limiter = RateLimiter::new(config).unwrap();

        for _ in 0..10 {
            assert!(limiter.check_client("A", Operation::Batch).is_ok());
        }
        assert_eq!(limiter.client_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_multiplier_scales_capacity() {
        let config = RateLimitConfig {
            burst_multiplier: 2.0,
            ..Default::default()
        }
        .with_operation(Operation::Extract, 2, 100);
        let limiter = RateLimiter::new(config).unwrap();

        for _ in 0..4 {
            assert!(limiter.check_client("A", Operation::Extract).is_ok());
        }
        assert!(limiter.check_client("A", Operation::Extract).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Scrape, 6, 1000)).unwrap();

        for _ in 0..6 {
            assert!(limiter.check_client("A", Operation::Scrape).is_ok());
        }
        let err = limiter.check_client("A", Operation::Scrape).unwrap_err();
        assert!((err.retry_after.as_secs_f64() - 10.0).abs() < 1e-6);
        assert!(err.to_string().ends_with("Retry in 10.0s"));

        time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check_client("A", Operation::Scrape).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_client() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Scrape, 1, 100)).unwrap();

        assert!(limiter.check_client("X", Operation::Scrape).is_ok());
        assert!(limiter.check_client("X", Operation::Scrape).is_err());

        limiter.reset_client("X");
        assert!(limiter.check_client("X", Operation::Scrape).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_leaves_global_buckets() {
        let config = RateLimitConfig {
            global_per_minute: 2,
            ..config()
        };
        let limiter = RateLimiter::new(config).unwrap();

        assert!(limiter.check_client("X", Operation::Map).is_ok());
        assert!(limiter.check_client("X", Operation::Map).is_ok());
        limiter.reset_client("X");

        assert_eq!(
            scope_of(limiter.check_client("X", Operation::Map)),
            RateLimitScope::Global(TimeWindow::Minute)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_buckets() {
        let config = RateLimitConfig {
            global_per_minute: 50,
            ..config()
        }
        .with_operation(Operation::Scrape, 10, 1000);
        let limiter = RateLimiter::new(config).unwrap();

        limiter.check_client("X", Operation::Scrape).unwrap();
        limiter.check_client("X", Operation::Scrape).unwrap();

        let status = limiter.status(Some("X"));
        assert_eq!(status.global.minute.limit, 50.0);
        assert_eq!(status.global.minute.remaining, 48.0);

        let client = status.client.unwrap();
        assert_eq!(client["scrape"]["minute"].limit, 10.0);
        assert_eq!(client["scrape"]["minute"].remaining, 8.0);
        assert_eq!(client["scrape"]["hour"].remaining, 998.0);

        let json = serde_json::to_value(limiter.status(None)).unwrap();
        assert!(json["global"]["hour"]["reset_time"].is_string());
        assert!(json.get("client").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_for_unknown_client_is_empty() {
        let limiter = RateLimiter::new(config()).unwrap();
        let status = limiter.status(Some("nobody"));
        assert_eq!(status.client, Some(BTreeMap::new()));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = RateLimitConfig {
            burst_multiplier: 0.9,
            ..Default::default()
        };
        assert!(matches!(RateLimiter::new(config), Err(FiregateError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_resolves_context() {
        let limiter = RateLimiter::new(config().with_operation(Operation::Map, 1, 100)).unwrap();
        let ctx = RequestContext::tool_call("firecrawl_map", json!({ "url": "https://example.com" }))
            .with_transport(TransportInfo {
                remote_addr: Some("10.1.1.1".to_string()),
                connection_id: None,
            });

        assert!(limiter.check(&ctx).is_ok());
        assert_eq!(
            scope_of(limiter.check(&ctx)),
            RateLimitScope::Operation {
                operation: Operation::Map,
                window: TimeWindow::Minute
            }
        );
        assert!(limiter.status(Some("ip:10.1.1.1")).client.unwrap().contains_key("map"));
    }

    struct FixedIdentifier;

    impl RequestIdentifier for FixedIdentifier {
        fn resolve_client_id(&self, _ctx: &RequestContext) -> String {
            "tenant-1".to_string()
        }

        fn resolve_operation(&self, _ctx: &RequestContext) -> Operation {
            Operation::Batch
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_identifier() {
        let limiter = RateLimiter::with_identifier(
            config().with_operation(Operation::Batch, 1, 10),
            Arc::new(FixedIdentifier),
        )
        .unwrap();

        let ctx = RequestContext::tool_call("firecrawl_scrape", json!({}));
        assert!(limiter.check(&ctx).is_ok());
        assert_eq!(
            scope_of(limiter.check(&ctx)),
            RateLimitScope::Operation {
                operation: Operation::Batch,
                window: TimeWindow::Minute
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_over_admit() {
        let config = RateLimitConfig {
            global_per_minute: 1000,
            ..config()
        }
        .with_operation(Operation::Search, 25, 1000);
        let limiter = Arc::new(RateLimiter::new(config).unwrap());

        let tasks = (0..100).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_client("shared", Operation::Search).is_ok() })
        });
        let admitted = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        // Allow for refill during the run; it is well under one token.
        assert!((25..=26).contains(&admitted), "admitted {}", admitted);
    }
}
