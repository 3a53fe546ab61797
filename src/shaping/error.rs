use std::{fmt, time::Duration};

use snafu::Snafu;

/// Invalid settings handed to one of the combinator constructors.
///
/// The combinators validate eagerly so a bad configuration surfaces when the wrapper is
/// built rather than as a timer that fires immediately or never.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// A window, ceiling or interval was zero.
    #[snafu(display("`{name}` must be greater than zero"))]
    ZeroDuration { name: &'static str },

    /// A rate limiter that admits nothing would never drain its queue.
    #[snafu(display("`max_requests` must be at least 1"))]
    ZeroMaxRequests,

    #[snafu(display("backoff `factor` must be finite and non-negative, got {factor}"))]
    InvalidFactor { factor: f64 },

    /// Timers are scheduled on the Tokio runtime that is current at construction.
    #[snafu(display("call shaping requires a Tokio runtime: {source}"))]
    MissingRuntime {
        source: tokio::runtime::TryCurrentError,
    },
}

/// Outcome of an operation submitted to a [`RateLimiter`](super::RateLimiter) that did
/// not produce a value.
///
/// The operation's own error is kept in `error` rather than exposed through `source()`,
/// so boxed trait objects such as [`crate::Error`] can be carried as well.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError<E>
where
    E: fmt::Debug + fmt::Display,
{
    /// The operation ran and failed.
    #[snafu(display("queued operation failed: {error}"))]
    Operation { error: E },

    /// The entry was discarded by `clear()` before it started, or the operation panicked.
    #[snafu(display("queued operation was abandoned before it settled"))]
    Abandoned,
}

/// Outcome of a [`Timeout`](super::Timeout) race that did not produce a value.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimeoutError<E>
where
    E: fmt::Debug + fmt::Display,
{
    /// The operation settled first, with an error.
    #[snafu(display("{error}"), context(name(TimedOperationSnafu)))]
    Operation { error: E },

    /// The deadline won the race.
    #[snafu(display("{message}"))]
    Elapsed { message: String, timeout: Duration },
}

impl<E> QueueError<E>
where
    E: fmt::Debug + fmt::Display,
{
    pub const fn is_abandoned(&self) -> bool {
        matches!(self, QueueError::Abandoned)
    }

    /// Returns the operation's own error, if it ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            QueueError::Operation { error } => Some(error),
            QueueError::Abandoned => None,
        }
    }
}

impl<E> TimeoutError<E>
where
    E: fmt::Debug + fmt::Display,
{
    pub const fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed { .. })
    }

    /// Returns the operation's own error, if it settled before the deadline.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            TimeoutError::Operation { error } => Some(error),
            TimeoutError::Elapsed { .. } => None,
        }
    }
}
