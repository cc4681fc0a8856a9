//! Token bucket counter implementation.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Time window a token bucket refills over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeWindow {
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
        }
    }

    /// Lowercase label used in scopes and status output.
    pub fn label(&self) -> &'static str {
        match self {
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A continuously refilling quota.
///
/// Buckets are not synchronized; the owning limiter serializes all access
/// behind its lock.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum number of tokens
    capacity: f64,
    /// Tokens currently available, always within `0..=capacity`
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// When tokens were last added
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Create a full bucket that refills its whole capacity over `window`.
    pub fn for_window(capacity: f64, window: TimeWindow) -> Self {
        Self::new(capacity, capacity / window.duration().as_secs_f64())
    }

    /// Refill, then take `n` tokens if that many are available.
    ///
    /// The refill is kept even when the bucket cannot satisfy the request.
    pub fn consume(&mut self, n: f64) -> bool {
        self.refill();

        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// How long until `n` tokens are available, based on the current count.
    pub fn time_until_available(&self, n: f64) -> Duration {
        if self.tokens >= n {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(((n - self.tokens) / self.refill_rate).max(0.0))
    }

    /// Tokens that would be available right now, without refilling.
    pub fn available(&self) -> f64 {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}
