use std::time::Duration;

use metrics::{counter, histogram};

use super::InternalEvent;

/// Which edge of a burst produced an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Leading,
    Trailing,
    /// Calls kept arriving past the `max_wait` ceiling.
    MaxWait,
}

impl Edge {
    pub const fn as_str(self) -> &'static str {
        match self {
            Edge::Leading => "leading",
            Edge::Trailing => "trailing",
            Edge::MaxWait => "max_wait",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EdgeInvoked {
    pub combinator: &'static str,
    pub edge: Edge,
}

impl InternalEvent for EdgeInvoked {
    fn emit(self) {
        counter!(
            "call_shaping_invocations_total",
            "combinator" => self.combinator,
            "edge" => self.edge.as_str()
        )
        .increment(1);
        trace!(
            target: "call_shaping::edge",
            combinator = self.combinator,
            edge = self.edge.as_str(),
            "Invoking wrapped function"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitWindowFull {
    pub max_requests: usize,
    pub interval: Duration,
    pub queued: usize,
}

impl InternalEvent for RateLimitWindowFull {
    fn emit(self) {
        counter!("rate_limiter_window_waits_total").increment(1);
        histogram!("rate_limiter_queue_depth").record(self.queued as f64);
        debug!(
            target: "call_shaping::rate_limit",
            max_requests = self.max_requests,
            interval_ms = self.interval.as_millis(),
            queued = self.queued,
            "Window exhausted; waiting for the next interval"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitQueueCleared {
    pub discarded: usize,
}

impl InternalEvent for RateLimitQueueCleared {
    fn emit(self) {
        counter!("rate_limiter_abandoned_total").increment(self.discarded as u64);
        debug!(
            target: "call_shaping::rate_limit",
            discarded = self.discarded,
            "Queue cleared"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitOperationPanicked;

impl InternalEvent for RateLimitOperationPanicked {
    fn emit(self) {
        counter!("rate_limiter_abandoned_total").increment(1);
        error!(
            target: "call_shaping::rate_limit",
            "Queued operation panicked; its caller observes an abandoned entry"
        );
    }
}

pub struct RetryScheduled<'a> {
    pub attempt: usize,
    pub delay: Duration,
    pub error: &'a dyn std::fmt::Display,
}

impl InternalEvent for RetryScheduled<'_> {
    fn emit(self) {
        counter!("retry_attempts_total").increment(1);
        histogram!("retry_backoff_seconds").record(self.delay);
        warn!(
            target: "call_shaping::retry",
            attempt = self.attempt,
            delay_ms = self.delay.as_millis(),
            error = %self.error,
            "Retrying after error"
        );
    }
}

pub struct RetriesExhausted<'a> {
    pub attempts: usize,
    pub error: &'a dyn std::fmt::Display,
}

impl InternalEvent for RetriesExhausted<'_> {
    fn emit(self) {
        counter!("retry_exhausted_total").increment(1);
        error!(
            target: "call_shaping::retry",
            attempts = self.attempts,
            error = %self.error,
            "Retries exhausted"
        );
    }
}

pub struct RetryDeclined<'a> {
    pub attempt: usize,
    pub error: &'a dyn std::fmt::Display,
}

impl InternalEvent for RetryDeclined<'_> {
    fn emit(self) {
        counter!("retry_declined_total").increment(1);
        debug!(
            target: "call_shaping::retry",
            attempt = self.attempt,
            error = %self.error,
            "Error is not retriable"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeadlineElapsed {
    pub timeout: Duration,
}

impl InternalEvent for DeadlineElapsed {
    fn emit(self) {
        counter!("timeout_elapsed_total").increment(1);
        warn!(
            target: "call_shaping::timeout",
            timeout_ms = self.timeout.as_millis(),
            "Deadline elapsed before the operation settled"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeduplicatorJoined {
    pub in_flight: usize,
}

impl InternalEvent for DeduplicatorJoined {
    fn emit(self) {
        counter!("deduplicator_joined_total").increment(1);
        trace!(
            target: "call_shaping::dedup",
            in_flight = self.in_flight,
            "Joining in-flight operation"
        );
    }
}
