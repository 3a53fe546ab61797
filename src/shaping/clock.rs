//! Clock and timer source for the edge-triggered combinators.
//!
//! Time comes from the Tokio time driver so a paused runtime drives every combinator
//! deterministically.

use std::time::Duration;

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, sleep},
};

pub(crate) fn now() -> Instant {
    Instant::now()
}

/// A scheduled callback. Dropping the handle cancels the callback if it has not run yet.
///
/// The `id` lets a callback recognise whether it is still the live timer of its owner: a
/// timer that lost a race with `cancel` or a re-arm must not act.
#[derive(Debug)]
pub(crate) struct Timer {
    id: u64,
    task: JoinHandle<()>,
}

impl Timer {
    pub(crate) fn schedule<F>(runtime: &Handle, id: u64, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = runtime.spawn(async move {
            sleep(delay).await;
            callback();
        });
        Timer { id, task }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
