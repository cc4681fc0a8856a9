//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod identity;
mod limiter;
mod operation;
mod rejection;
mod rules;
mod sliding;
mod status;
mod window;

pub use backend::RateLimitBackend;
pub use bucket::{TimeWindow, TokenBucket};
pub use identity::{classify_operation, DefaultIdentifier, RequestIdentifier, DEFAULT_CLIENT_ID};
pub use limiter::RateLimiter;
pub use operation::Operation;
pub use rejection::{RateLimitDetails, RateLimitExceeded, RateLimitScope};
pub use rules::{
    OperationLimits, RateLimitAlgorithm, RateLimitConfig, SlidingWindowConfig, WindowOverride,
};
pub use sliding::SlidingWindowLimiter;
pub use status::{CounterStatus, RateLimitStatus, SlidingWindowStatus, WindowPairStatus};
pub use window::SlidingWindow;
