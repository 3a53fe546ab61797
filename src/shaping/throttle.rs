use std::{sync::Arc, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::runtime::Handle;

use super::{
    edge::{EdgeConfig, EdgeCore},
    error::{ConfigError, MissingRuntimeSnafu, ZeroDurationSnafu},
};

/// Configuration of a [`Throttle`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `wait` | required | Length of the window; at most one invocation per window |
/// | `leading` | `true` | Invoke on the first call of a quiet period |
/// | `trailing` | `true` | Invoke with the latest arguments once the window closes |
///
/// Setting both edges to `false` is accepted; such a throttle never invokes.
#[derive(Clone, Copy, Debug, Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleSettings {
    #[serde(with = "super::duration_ms")]
    pub(super) wait: Duration,

    #[builder(default = true)]
    #[serde(default = "default_edge")]
    pub(super) leading: bool,

    #[builder(default = true)]
    #[serde(default = "default_edge")]
    pub(super) trailing: bool,
}

const fn default_edge() -> bool {
    true
}

impl ThrottleSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.wait.is_zero(), ZeroDurationSnafu { name: "wait" });
        Ok(())
    }

    pub fn get_wait(&self) -> Duration {
        self.wait
    }

    fn edge_config(&self) -> EdgeConfig {
        EdgeConfig {
            combinator: "throttle",
            wait: self.wait,
            leading: self.leading,
            trailing: self.trailing,
            max_wait: Some(self.wait),
            max_timer: false,
        }
    }
}

/// Bounds how often a function runs: at most once per `wait`.
///
/// Calls made while a window is open only replace the pending arguments; the latest ones
/// are used for the trailing invocation. Every call returns the result of the most recent
/// invocation, which may be from an earlier call.
///
/// ```no_run
/// use std::time::Duration;
/// use call_shaping::shaping::{Throttle, ThrottleSettings};
///
/// # fn demo() -> Result<(), call_shaping::shaping::ConfigError> {
/// let on_scroll = Throttle::new(
///     |offset: u32| println!("scrolled to {offset}"),
///     ThrottleSettings::builder().wait(Duration::from_millis(200)).build(),
/// )?;
/// on_scroll.call(10);
/// on_scroll.call(20); // coalesced into the trailing edge
/// # Ok(())
/// # }
/// ```
pub struct Throttle<A, R> {
    core: Arc<EdgeCore<A, R>>,
}

impl<A, R> Clone for Throttle<A, R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A, R> Throttle<A, R>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Wraps `func`. Timers run on the Tokio runtime that is current here.
    pub fn new<F>(func: F, settings: ThrottleSettings) -> Result<Self, ConfigError>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        settings.validate()?;
        let runtime = Handle::try_current().context(MissingRuntimeSnafu)?;
        Ok(Self {
            core: EdgeCore::new(settings.edge_config(), func, runtime),
        })
    }

    pub fn call(&self, args: A) -> Option<R> {
        self.core.call(args)
    }

    /// Drops the pending call and timer without invoking. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.core.cancel()
    }

    /// Runs the trailing edge now if one is pending; otherwise returns the last result.
    pub fn flush(&self) -> Option<R> {
        self.core.flush()
    }

    pub fn pending(&self) -> bool {
        self.core.pending()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::{InvocationLog, assert_near, trace_init};

    fn settings(leading: bool, trailing: bool) -> ThrottleSettings {
        ThrottleSettings::builder()
            .wait(Duration::from_millis(100))
            .leading(leading)
            .trailing(trailing)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn leading_and_trailing_edges() {
        trace_init();
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(true, true)).unwrap();

        for at in [0, 10, 50, 90] {
            log.sleep_until(at).await;
            let result = throttled.call(at);
            assert_eq!(result, Some(0), "call at {at} returns the leading result");
        }
        log.sleep_until(500).await;

        let calls = log.entries();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert_near(calls[0].0, 0);
        assert_eq!(calls[0].1, 0);
        assert_near(calls[1].0, 190);
        assert_eq!(calls[1].1, 90);
        assert!(!throttled.pending());
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_disabled() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(true, false)).unwrap();

        for at in [0, 10, 50] {
            log.sleep_until(at).await;
            throttled.call(at);
        }
        log.sleep_until(300).await;
        throttled.call(300);
        log.sleep_until(600).await;

        let args: Vec<u64> = log.entries().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, vec![0, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_disabled() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(false, true)).unwrap();

        assert_eq!(throttled.call(0), None);
        log.sleep_until(10).await;
        assert_eq!(throttled.call(10), None);
        log.sleep_until(400).await;

        let calls = log.entries();
        assert_eq!(calls.len(), 1, "{calls:?}");
        assert_near(calls[0].0, 110);
        assert_eq!(calls[0].1, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_calls_fire_once_per_window() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(true, true)).unwrap();

        for at in (0..=390).step_by(30) {
            log.sleep_until(at).await;
            throttled.call(at);
        }
        log.sleep_until(1_000).await;

        let calls = log.entries();
        assert!(calls.len() >= 4, "{calls:?}");
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= 95, "invocations too close: {calls:?}");
        }
        assert_eq!(calls.first().map(|(_, args)| *args), Some(0));
        assert_eq!(calls.last().map(|(_, args)| *args), Some(390));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_call() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(true, true)).unwrap();

        throttled.call(0);
        log.sleep_until(10).await;
        throttled.call(10);
        assert!(throttled.pending());

        throttled.cancel();
        assert!(!throttled.pending());
        throttled.cancel();

        log.sleep_until(500).await;
        let args: Vec<u64> = log.entries().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_runs_trailing_edge_now() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(false, true)).unwrap();

        assert_eq!(throttled.flush(), None);
        throttled.call(7);
        assert_eq!(throttled.flush(), Some(7));
        assert!(!throttled.pending());
        assert_eq!(throttled.flush(), Some(7));

        log.sleep_until(500).await;
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn both_edges_disabled_never_fires() {
        let log = InvocationLog::new();
        let throttled = Throttle::new(log.recorder(), settings(false, false)).unwrap();

        for at in (0..=500).step_by(40) {
            log.sleep_until(at).await;
            assert_eq!(throttled.call(at), None);
        }
        log.sleep_until(1_000).await;
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn rejects_zero_wait() {
        let settings = ThrottleSettings::builder().wait(Duration::ZERO).build();
        let result = Throttle::new(|_: ()| (), settings);
        assert!(matches!(
            result,
            Err(ConfigError::ZeroDuration { name: "wait" })
        ));
    }

    #[test]
    fn requires_runtime() {
        let result = Throttle::new(|_: ()| (), settings(true, true));
        assert!(matches!(result, Err(ConfigError::MissingRuntime { .. })));
    }

    #[test]
    fn settings_from_json() {
        let settings: ThrottleSettings =
            serde_json::from_str(r#"{ "wait": 250, "trailing": false }"#).unwrap();
        assert_eq!(settings.get_wait(), Duration::from_millis(250));
        assert!(settings.leading);
        assert!(!settings.trailing);

        let unknown = serde_json::from_str::<ThrottleSettings>(r#"{ "wait": 1, "delay": 2 }"#);
        assert!(unknown.is_err());
    }
}
