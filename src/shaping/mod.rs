//! Combinators that decide when, how often and how resiliently a wrapped operation runs.
//!
//! [`Throttle`] and [`Debounce`] wrap synchronous functions and share one edge-timing
//! core. [`RateLimiter`], [`Retry`], [`with_timeout`] and [`Deduplicator`] wrap async
//! operations and compose freely; each settings type is built with `bon` and can be
//! deserialized with durations given in milliseconds.

mod clock;
mod debounce;
mod dedup;
mod duration_ms;
mod edge;
pub mod error;
pub mod internal_event;
mod rate_limit;
mod retries;
mod throttle;
mod timeout;

pub use debounce::{Debounce, DebounceSettings};
pub use dedup::{Deduplicator, InFlight};
pub use error::{ConfigError, QueueError, TimeoutError};
pub use rate_limit::{Enqueued, RateLimitSettings, RateLimiter};
pub use retries::{
    AlwaysRetry, ExponentialBackoff, JitterMode, Retry, RetryIf, RetryLogic, RetrySettings,
    retry,
};
pub use throttle::{Throttle, ThrottleSettings};
pub use timeout::{Timeout, with_timeout, with_timeout_message};
