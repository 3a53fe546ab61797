use std::{
    borrow::Cow,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use pin_project::pin_project;
use tokio::time::{Sleep, sleep};

use super::{
    error::TimeoutError,
    internal_event::{DeadlineElapsed, InternalEvent},
};

const DEFAULT_MESSAGE: &str = "Operation timed out";

/// Races `future` against a deadline of `timeout`, measured from this call.
///
/// If the deadline wins, the future is dropped and the caller gets
/// [`TimeoutError::Elapsed`] whose message is `"Operation timed out"`.
pub fn with_timeout<F, T, E>(future: F, timeout: Duration) -> Timeout<F>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Debug + fmt::Display,
{
    with_timeout_message(future, timeout, DEFAULT_MESSAGE)
}

/// Like [`with_timeout`], with a custom message for the elapsed error.
pub fn with_timeout_message<F, T, E>(
    future: F,
    timeout: Duration,
    message: impl Into<Cow<'static, str>>,
) -> Timeout<F>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Debug + fmt::Display,
{
    Timeout {
        inner: future,
        deadline: sleep(timeout),
        timeout,
        message: message.into(),
    }
}

/// Future returned by [`with_timeout`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timeout<F> {
    #[pin]
    inner: F,
    #[pin]
    deadline: Sleep,
    timeout: Duration,
    message: Cow<'static, str>,
}

impl<F> Timeout<F> {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F, T, E> Future for Timeout<F>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Debug + fmt::Display,
{
    type Output = Result<T, TimeoutError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // An operation that settles on the same tick as the deadline still wins.
        if let Poll::Ready(outcome) = this.inner.poll(cx) {
            return Poll::Ready(outcome.map_err(|error| TimeoutError::Operation { error }));
        }

        match this.deadline.poll(cx) {
            Poll::Ready(()) => {
                DeadlineElapsed {
                    timeout: *this.timeout,
                }
                .emit();
                Poll::Ready(Err(TimeoutError::Elapsed {
                    message: std::mem::take(this.message).into_owned(),
                    timeout: *this.timeout,
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
