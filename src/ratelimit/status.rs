//! Read-only snapshots of limiter state.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Limit, remaining quota and reset estimate for one counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterStatus {
    pub limit: f64,
    pub remaining: f64,
    pub reset_time: DateTime<Utc>,
}

impl CounterStatus {
    pub(crate) fn new(limit: f64, remaining: f64, reset_in: Duration) -> Self {
        let reset_in = chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            limit,
            remaining: remaining.floor(),
            reset_time: Utc::now() + reset_in,
        }
    }
}

/// Minute and hour counters for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowPairStatus {
    pub minute: CounterStatus,
    pub hour: CounterStatus,
}

/// Token-bucket limiter status.
///
/// Serializes to `global.minute.{limit,remaining,reset_time}`,
/// `global.hour.{...}` and, when a client was requested,
/// `client.<operation>.<minute|hour>.{...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub global: WindowPairStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<BTreeMap<String, BTreeMap<String, CounterStatus>>>,
}

/// Sliding-window limiter status: `enabled` plus
/// `client.<operation>.{limit,remaining,reset_time}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlidingWindowStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<BTreeMap<String, CounterStatus>>,
}
