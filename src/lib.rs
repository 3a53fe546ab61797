//! Call-shaping combinators: control *when*, *how often* and *with what resilience* an
//! operation runs.
//!
//! # Combinators
//!
//! | Combinator | Wraps | Purpose |
//! |------------|-------|---------|
//! | [`Throttle`](shaping::Throttle) | `Fn(A) -> R` | at most one invocation per window, leading/trailing edge control |
//! | [`Debounce`](shaping::Debounce) | `Fn(A) -> R` | invoke once calls stop arriving, optional `max_wait` ceiling |
//! | [`RateLimiter`](shaping::RateLimiter) | async op | FIFO queue, at most N starts per interval |
//! | [`Retry`](shaping::Retry) | async op | exponential backoff until success, exhaustion or a stop predicate |
//! | [`with_timeout`](shaping::with_timeout) | future | race the operation against a deadline |
//! | [`Deduplicator`](shaping::Deduplicator) | async op | single-flight per key |
//!
//! Throttle and Debounce schedule their timers on the Tokio runtime that was current when
//! they were built; their `call` is synchronous and may be used from any thread.
//!
//! # Composition
//!
//! The combinators are independent. A typical stack around a network call is
//! dedup → rate-limit → retry → timeout:
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use call_shaping::shaping::{
//!     Deduplicator, RateLimitSettings, RateLimiter, Retry, RetrySettings, with_timeout,
//! };
//!
//! # async fn lookup(id: u64) -> Result<String, std::io::Error> { Ok(id.to_string()) }
//! # async fn demo() -> Result<(), call_shaping::Error> {
//! let limiter = RateLimiter::new(
//!     RateLimitSettings::builder()
//!         .max_requests(10)
//!         .interval(Duration::from_secs(1))
//!         .build(),
//! )?;
//! let retry = Retry::new(RetrySettings::builder().max_retries(2).build())?;
//! let dedup = Deduplicator::new()?;
//!
//! // Errors are shared between deduplicated callers, so they must be `Clone`.
//! let name = dedup
//!     .execute(7_u64, move || async move {
//!         limiter
//!             .execute(move || {
//!                 retry.run(|| with_timeout(lookup(7), Duration::from_millis(500)))
//!             })
//!             .await
//!             .map_err(Arc::new)
//!     })
//!     .await?;
//! # let _ = name;
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//! Emits metrics via the [`InternalEvent`](shaping::internal_event::InternalEvent) trait.
pub mod shaping;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
