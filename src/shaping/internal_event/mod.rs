//! Observable events emitted by the combinators.
//!
//! Every event records its metric through the `metrics` facade and logs the matching
//! `tracing` line, so an application gets both by installing a recorder and a subscriber.

mod call_shaping;

pub use self::call_shaping::*;

/// An event that can be recorded exactly once.
pub trait InternalEvent: Sized {
    fn emit(self);
}
