use std::{cmp, fmt::Display, future::Future, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use tokio::time::sleep;

use super::{
    error::{ConfigError, InvalidFactorSnafu},
    internal_event::{InternalEvent, RetriesExhausted, RetryDeclined, RetryScheduled},
};

/// Decides which failures are retried and observes the retries that happen.
///
/// `attempt` is the zero-based index of the attempt that just failed.
///
/// # Example
/// ```rust
/// use call_shaping::shaping::RetryLogic;
///
/// struct TransientOnly;
///
/// impl RetryLogic<std::io::Error> for TransientOnly {
///     fn should_retry(&self, error: &std::io::Error, _attempt: usize) -> bool {
///         error.kind() == std::io::ErrorKind::TimedOut
///     }
/// }
/// ```
pub trait RetryLogic<E>: Send + Sync {
    /// Returning `false` stops retrying and hands `error` to the caller.
    fn should_retry(&self, _error: &E, _attempt: usize) -> bool {
        true
    }

    /// Called before sleeping ahead of the next attempt.
    fn on_retry(&self, _error: &E, _attempt: usize) {}
}

/// Retries every error.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRetry;

impl<E> RetryLogic<E> for AlwaysRetry {}

/// Adapts a `Fn(&E, attempt) -> bool` predicate into a [`RetryLogic`].
#[derive(Clone, Copy, Debug)]
pub struct RetryIf<F>(pub F);

impl<E, F> RetryLogic<E> for RetryIf<F>
where
    F: Fn(&E, usize) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E, attempt: usize) -> bool {
        (self.0)(error, attempt)
    }
}

/// The jitter mode to use for retry backoff behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterMode {
    /// No jitter.
    #[default]
    None,

    /// Full jitter.
    ///
    /// The random delay is anywhere from 0 up to the delay calculated by the backoff
    /// strategy.
    Full,
}

impl JitterMode {
    pub fn apply(self, delay: Duration) -> Duration {
        match self {
            JitterMode::None => delay,
            JitterMode::Full => delay.mul_f64(rand::random::<f64>()),
        }
    }
}

/// A retry strategy driven by exponential back-off.
///
/// Yields the initial delay first and multiplies it by `factor` after every step, up to
/// an optional ceiling.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    factor: f64,
    max_delay: Option<Duration>,
}

impl ExponentialBackoff {
    pub const fn new(initial: Duration, factor: f64) -> ExponentialBackoff {
        ExponentialBackoff {
            current: initial,
            factor,
            max_delay: None,
        }
    }

    /// Apply a maximum delay. No retry delay will be longer than this `Duration`.
    pub const fn max_delay(mut self, duration: Duration) -> ExponentialBackoff {
        self.max_delay = Some(duration);
        self
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = match self.max_delay {
            Some(max_delay) => cmp::min(self.current, max_delay),
            None => self.current,
        };

        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor)
            .unwrap_or(Duration::MAX);

        Some(delay)
    }
}

/// Configuration of a [`Retry`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `max_retries` | 3 | Retries after the first attempt; at most `max_retries + 1` attempts |
/// | `delay` | 1000 ms | Sleep before the first retry |
/// | `factor` | 2.0 | Multiplier applied to the delay after every retry |
/// | `max_delay` | none | Ceiling on a single delay; unbounded when unset |
/// | `jitter_mode` | `none` | Randomise each delay between zero and its computed value |
#[derive(Clone, Copy, Debug, Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[builder(default = default_max_retries())]
    #[serde(default = "default_max_retries")]
    pub(super) max_retries: usize,

    #[builder(default = default_delay())]
    #[serde(default = "default_delay", with = "super::duration_ms")]
    pub(super) delay: Duration,

    #[builder(default = default_factor())]
    #[serde(default = "default_factor")]
    pub(super) factor: f64,

    #[serde(default, with = "super::duration_ms::option")]
    pub(super) max_delay: Option<Duration>,

    #[builder(default)]
    #[serde(default)]
    pub(super) jitter_mode: JitterMode,
}

const fn default_max_retries() -> usize {
    3
}

const fn default_delay() -> Duration {
    Duration::from_millis(1000)
}

const fn default_factor() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay: default_delay(),
            factor: default_factor(),
            max_delay: None,
            jitter_mode: JitterMode::default(),
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.factor.is_finite() && self.factor >= 0.0,
            InvalidFactorSnafu {
                factor: self.factor
            }
        );
        Ok(())
    }

    pub fn get_max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        let backoff = ExponentialBackoff::new(self.delay, self.factor);
        match self.max_delay {
            Some(max_delay) => backoff.max_delay(max_delay),
            None => backoff,
        }
    }
}

/// Re-runs a fallible async operation with exponential backoff.
///
/// The error of the last attempt is returned once retries are exhausted or the
/// [`RetryLogic`] declines to retry; errors of earlier attempts are discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Retry {
    settings: RetrySettings,
}

impl Retry {
    pub fn new(settings: RetrySettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    pub async fn run<F, Fut, T, E>(self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_with(AlwaysRetry, op).await
    }

    pub async fn run_with<L, F, Fut, T, E>(self, logic: L, mut op: F) -> Result<T, E>
    where
        L: RetryLogic<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut backoff = self.settings.backoff();
        let mut attempt = 0;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.settings.max_retries {
                RetriesExhausted {
                    attempts: attempt + 1,
                    error: &error,
                }
                .emit();
                return Err(error);
            }

            if !logic.should_retry(&error, attempt) {
                RetryDeclined {
                    attempt,
                    error: &error,
                }
                .emit();
                return Err(error);
            }

            let delay = self
                .settings
                .jitter_mode
                .apply(backoff.next().unwrap_or_default());

            logic.on_retry(&error, attempt);
            RetryScheduled {
                attempt,
                delay,
                error: &error,
            }
            .emit();
            drop(error);

            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Runs `op` with [`RetrySettings::default`]: up to 3 retries starting at one second and
/// doubling.
pub async fn retry<F, Fut, T, E>(op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    Retry::default().run(op).await
}
