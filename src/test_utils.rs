use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::{Instant, sleep_until};

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Tolerance for timings observed under the paused clock, which rounds timer deadlines up
/// to whole milliseconds.
const TOLERANCE_MS: u64 = 5;

#[track_caller]
pub fn assert_near(actual_ms: u64, expected_ms: u64) {
    assert!(
        actual_ms.abs_diff(expected_ms) <= TOLERANCE_MS,
        "expected ~{expected_ms}ms, observed {actual_ms}ms"
    );
}

/// Records every invocation of a wrapped function together with the time it happened,
/// in milliseconds since the log was created.
#[derive(Clone)]
pub struct InvocationLog<A> {
    start: Instant,
    entries: Arc<Mutex<Vec<(u64, A)>>>,
}

impl<A> InvocationLog<A>
where
    A: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap()
    }

    /// A function that logs its argument and returns it.
    pub fn recorder(&self) -> impl Fn(A) -> A + Send + Sync + use<A> {
        let log = self.clone();
        move |args: A| {
            log.record(args.clone());
            args
        }
    }

    pub fn record(&self, args: A) {
        let at = self.elapsed_ms();
        self.entries.lock().unwrap().push((at, args));
    }

    pub fn entries(&self) -> Vec<(u64, A)> {
        self.entries.lock().unwrap().clone()
    }

    pub async fn sleep_until(&self, at_ms: u64) {
        sleep_until(self.start + Duration::from_millis(at_ms)).await;
    }
}
