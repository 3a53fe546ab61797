use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, ready},
    time::Duration,
};

use bon::Builder;
use futures::{FutureExt, future::BoxFuture};
use pin_project::pin_project;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::{runtime::Handle, sync::oneshot, time::sleep};

use super::{
    error::{
        ConfigError, MissingRuntimeSnafu, QueueError, ZeroDurationSnafu, ZeroMaxRequestsSnafu,
    },
    internal_event::{
        InternalEvent, RateLimitOperationPanicked, RateLimitQueueCleared, RateLimitWindowFull,
    },
};

/// Configuration of a [`RateLimiter`]: at most `max_requests` operations start per
/// `interval`.
#[derive(Clone, Copy, Debug, Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    pub(super) max_requests: usize,

    #[serde(with = "super::duration_ms")]
    pub(super) interval: Duration,
}

impl RateLimitSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.max_requests > 0, ZeroMaxRequestsSnafu);
        ensure!(!self.interval.is_zero(), ZeroDurationSnafu { name: "interval" });
        Ok(())
    }

    pub fn get_max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn get_interval(&self) -> Duration {
        self.interval
    }
}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueueState {
    queue: VecDeque<Job>,
    processing: bool,
    started_in_window: usize,
}

struct Shared {
    settings: RateLimitSettings,
    runtime: Handle,
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Step {
    Run(Job),
    WaitForWindow { queued: usize },
    Done,
}

/// A FIFO queue that starts at most `max_requests` operations per `interval`.
///
/// Operations run one after another on a single drain task, in submission order. The
/// window counter resets only after the drain task has waited a full `interval`, so a
/// window never admits more than `max_requests` starts. A failing operation only settles
/// its own [`Enqueued`] future.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Builds a limiter whose drain task runs on the Tokio runtime that is current here.
    pub fn new(settings: RateLimitSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let runtime = Handle::try_current().context(MissingRuntimeSnafu)?;
        Ok(Self {
            shared: Arc::new(Shared {
                settings,
                runtime,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    processing: false,
                    started_in_window: 0,
                }),
            }),
        })
    }

    /// Queues `op`. The operation is queued immediately, not when the returned future is
    /// first polled, and runs even if that future is dropped.
    pub fn execute<F, Fut, T, E>(&self, op: F) -> Enqueued<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Debug + fmt::Display + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                match AssertUnwindSafe(async move { op().await })
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => {
                        let _ = sender.send(outcome);
                    }
                    Err(_) => RateLimitOperationPanicked.emit(),
                }
            }
            .boxed()
        });

        let start_drain = {
            let mut state = self.shared.lock();
            state.queue.push_back(job);
            !std::mem::replace(&mut state.processing, true)
        };
        if start_drain {
            self.shared.runtime.spawn(drain(Arc::clone(&self.shared)));
        }

        Enqueued { receiver }
    }

    /// Discards every queued operation that has not started. Their callers observe
    /// [`QueueError::Abandoned`]; the operation currently running is unaffected.
    pub fn clear(&self) {
        let discarded = std::mem::take(&mut self.shared.lock().queue);
        RateLimitQueueCleared {
            discarded: discarded.len(),
        }
        .emit();
    }

    /// Number of queued operations that have not started yet.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn drain(shared: Arc<Shared>) {
    let RateLimitSettings {
        max_requests,
        interval,
    } = shared.settings;

    loop {
        let step = {
            let mut state = shared.lock();
            if state.queue.is_empty() {
                state.processing = false;
                Step::Done
            } else if state.started_in_window >= max_requests {
                Step::WaitForWindow {
                    queued: state.queue.len(),
                }
            } else {
                match state.queue.pop_front() {
                    Some(job) => {
                        state.started_in_window += 1;
                        Step::Run(job)
                    }
                    None => Step::Done,
                }
            }
        };

        match step {
            Step::Run(job) => job().await,
            Step::WaitForWindow { queued } => {
                RateLimitWindowFull {
                    max_requests,
                    interval,
                    queued,
                }
                .emit();
                sleep(interval).await;
                shared.lock().started_in_window = 0;
            }
            Step::Done => return,
        }
    }
}

/// The result of an operation queued on a [`RateLimiter`].
#[pin_project]
#[must_use = "the operation runs regardless; await this to observe its result"]
pub struct Enqueued<T, E> {
    #[pin]
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for Enqueued<T, E>
where
    E: fmt::Debug + fmt::Display,
{
    type Output = Result<T, QueueError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        Poll::Ready(match ready!(this.receiver.poll(cx)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(QueueError::Operation { error }),
            Err(_) => Err(QueueError::Abandoned),
        })
    }
}
