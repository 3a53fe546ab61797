//! Edge-triggered invocation machinery shared by [`Throttle`](super::Throttle) and
//! [`Debounce`](super::Debounce).
//!
//! Both wrappers keep the latest call's arguments, a clock state and at most one live
//! primary timer. They differ only in what the timer and the call path are allowed to
//! fire on, which [`EdgeConfig`] captures.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{runtime::Handle, time::Instant};

use super::{
    clock::{self, Timer},
    internal_event::{Edge, EdgeInvoked, InternalEvent},
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct EdgeConfig {
    pub(crate) combinator: &'static str,
    pub(crate) wait: Duration,
    pub(crate) leading: bool,
    pub(crate) trailing: bool,
    /// Ceiling on the time between invocations while calls keep arriving.
    pub(crate) max_wait: Option<Duration>,
    /// Enforce `max_wait` with a secondary timer and let the primary timer fire on it.
    pub(crate) max_timer: bool,
}

impl EdgeConfig {
    const fn enabled(&self) -> bool {
        self.leading || self.trailing
    }
}

#[derive(Clone, Copy, Debug)]
enum TimerSlot {
    Primary,
    MaxWait,
}

struct EdgeState<A, R> {
    last_args: Option<A>,
    last_call_time: Option<Instant>,
    last_invoke_time: Option<Instant>,
    result: Option<R>,
    timer: Option<Timer>,
    max_timer: Option<Timer>,
    timer_seq: u64,
}

type Invocation<A> = Option<(A, Edge)>;

pub(crate) struct EdgeCore<A, R> {
    config: EdgeConfig,
    func: Box<dyn Fn(A) -> R + Send + Sync>,
    runtime: Handle,
    state: Mutex<EdgeState<A, R>>,
}

impl<A, R> EdgeCore<A, R>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
{
    pub(crate) fn new<F>(config: EdgeConfig, func: F, runtime: Handle) -> Arc<Self>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Arc::new(EdgeCore {
            config,
            func: Box::new(func),
            runtime,
            state: Mutex::new(EdgeState {
                last_args: None,
                last_call_time: None,
                last_invoke_time: None,
                result: None,
                timer: None,
                max_timer: None,
                timer_seq: 0,
            }),
        })
    }

    pub(crate) fn call(self: &Arc<Self>, args: A) -> Option<R> {
        let now = clock::now();
        let mut state = self.lock();
        let is_invoking = self.should_invoke(&state, now);

        state.last_args = Some(args);
        state.last_call_time = Some(now);

        let invocation = if is_invoking && state.timer.is_none() {
            self.leading_edge(&mut state, now)
        } else if is_invoking && self.config.max_wait.is_some() {
            // Calls kept arriving for a whole window: restart it and fire now.
            self.arm(&mut state, TimerSlot::Primary, self.config.wait);
            if self.config.enabled() {
                Self::take_invocation(&mut state, now, Edge::MaxWait)
            } else {
                None
            }
        } else {
            if state.timer.is_none() {
                self.arm(&mut state, TimerSlot::Primary, self.config.wait);
            }
            None
        };

        drop(state);
        self.finish(invocation)
    }

    pub(crate) fn cancel(&self) {
        let mut state = self.lock();
        state.timer = None;
        state.max_timer = None;
        state.last_args = None;
        state.last_call_time = None;
        state.last_invoke_time = None;
    }

    pub(crate) fn flush(&self) -> Option<R> {
        let mut state = self.lock();
        if state.timer.is_none() {
            return state.result.clone();
        }
        let invocation = self.trailing_edge(&mut state, clock::now());
        drop(state);
        self.finish(invocation)
    }

    pub(crate) fn pending(&self) -> bool {
        self.lock().timer.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, EdgeState<A, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the wrapped function outside the state lock and records its result.
    fn finish(&self, invocation: Invocation<A>) -> Option<R> {
        match invocation {
            Some((args, edge)) => {
                EdgeInvoked {
                    combinator: self.config.combinator,
                    edge,
                }
                .emit();
                let result = (self.func)(args);
                self.lock().result = Some(result.clone());
                Some(result)
            }
            None => self.lock().result.clone(),
        }
    }

    fn take_invocation(state: &mut EdgeState<A, R>, now: Instant, edge: Edge) -> Invocation<A> {
        let args = state.last_args.take()?;
        state.last_invoke_time = Some(now);
        Some((args, edge))
    }

    fn should_invoke(&self, state: &EdgeState<A, R>, now: Instant) -> bool {
        self.quiet_period_over(state, now) || self.max_wait_reached(state, now)
    }

    /// True when there was no prior call, `wait` has passed since it, or the clock went
    /// backwards.
    fn quiet_period_over(&self, state: &EdgeState<A, R>, now: Instant) -> bool {
        let Some(last_call) = state.last_call_time else {
            return true;
        };
        match now.checked_duration_since(last_call) {
            Some(since_call) => since_call >= self.config.wait,
            None => true,
        }
    }

    fn max_wait_reached(&self, state: &EdgeState<A, R>, now: Instant) -> bool {
        let Some(max_wait) = self.config.max_wait else {
            return false;
        };
        match state.last_invoke_time {
            Some(last_invoke) => now.saturating_duration_since(last_invoke) >= max_wait,
            None => true,
        }
    }

    fn remaining_wait(&self, state: &EdgeState<A, R>, now: Instant) -> Duration {
        let since_call = state
            .last_call_time
            .map(|last_call| now.saturating_duration_since(last_call))
            .unwrap_or_default();
        let quiet = self.config.wait.saturating_sub(since_call);

        // The max-wait timer is one-shot, so the re-armed primary timer enforces the
        // ceiling for the rest of the burst.
        match (self.config.max_timer, self.config.max_wait) {
            (true, Some(max_wait)) => {
                let since_invoke = state
                    .last_invoke_time
                    .map(|last_invoke| now.saturating_duration_since(last_invoke))
                    .unwrap_or_default();
                quiet.min(max_wait.saturating_sub(since_invoke))
            }
            _ => quiet,
        }
    }

    fn leading_edge(self: &Arc<Self>, state: &mut EdgeState<A, R>, now: Instant) -> Invocation<A> {
        state.last_invoke_time = Some(now);
        self.arm(state, TimerSlot::Primary, self.config.wait);
        if self.config.max_timer {
            if let Some(max_wait) = self.config.max_wait {
                self.arm(state, TimerSlot::MaxWait, max_wait);
            }
        }

        if self.config.leading {
            Self::take_invocation(state, now, Edge::Leading)
        } else {
            None
        }
    }

    fn trailing_edge(&self, state: &mut EdgeState<A, R>, now: Instant) -> Invocation<A> {
        state.timer = None;
        state.max_timer = None;

        if self.config.trailing && state.last_args.is_some() {
            return Self::take_invocation(state, now, Edge::Trailing);
        }
        state.last_args = None;
        None
    }

    fn arm(self: &Arc<Self>, state: &mut EdgeState<A, R>, slot: TimerSlot, delay: Duration) {
        state.timer_seq += 1;
        let id = state.timer_seq;
        let core = Arc::downgrade(self);
        let timer = Timer::schedule(&self.runtime, id, delay, move || {
            if let Some(core) = core.upgrade() {
                core.timer_fired(slot, id);
            }
        });

        match slot {
            TimerSlot::Primary => state.timer = Some(timer),
            TimerSlot::MaxWait => state.max_timer = Some(timer),
        }
    }

    fn timer_fired(self: &Arc<Self>, slot: TimerSlot, id: u64) {
        let now = clock::now();
        let mut state = self.lock();

        let invocation = match slot {
            TimerSlot::Primary => {
                if state.timer.as_ref().map(Timer::id) != Some(id) {
                    return;
                }
                let due = self.quiet_period_over(&state, now)
                    || (self.config.max_timer && self.max_wait_reached(&state, now));
                if due {
                    self.trailing_edge(&mut state, now)
                } else {
                    let remaining = self.remaining_wait(&state, now);
                    trace!(
                        target: "call_shaping::edge",
                        combinator = self.config.combinator,
                        remaining_ms = remaining.as_millis(),
                        "Calls still arriving; re-arming timer"
                    );
                    self.arm(&mut state, TimerSlot::Primary, remaining);
                    None
                }
            }
            TimerSlot::MaxWait => {
                if state.max_timer.as_ref().map(Timer::id) != Some(id) {
                    return;
                }
                state.max_timer = None;
                if self.config.enabled() {
                    Self::take_invocation(&mut state, now, Edge::MaxWait)
                } else {
                    None
                }
            }
        };

        drop(state);
        self.finish(invocation);
    }
}
