use std::{sync::Arc, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::runtime::Handle;

use super::{
    edge::{EdgeConfig, EdgeCore},
    error::{ConfigError, MissingRuntimeSnafu, ZeroDurationSnafu},
};

/// Configuration of a [`Debounce`].
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `wait` | required | Silence required after the last call before invoking |
/// | `max_wait` | none | Longest time a burst may postpone an invocation |
/// | `leading` | `false` | Invoke on the first call of a burst |
/// | `trailing` | `true` | Invoke with the latest arguments once the burst ends |
#[derive(Clone, Copy, Debug, Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebounceSettings {
    #[serde(with = "super::duration_ms")]
    pub(super) wait: Duration,

    #[serde(default, with = "super::duration_ms::option")]
    pub(super) max_wait: Option<Duration>,

    #[builder(default)]
    #[serde(default)]
    pub(super) leading: bool,

    #[builder(default = true)]
    #[serde(default = "default_trailing")]
    pub(super) trailing: bool,
}

const fn default_trailing() -> bool {
    true
}

impl DebounceSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.wait.is_zero(), ZeroDurationSnafu { name: "wait" });
        ensure!(
            !self.max_wait.is_some_and(|max_wait| max_wait.is_zero()),
            ZeroDurationSnafu { name: "max_wait" }
        );
        Ok(())
    }

    pub fn get_wait(&self) -> Duration {
        self.wait
    }

    pub fn get_max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    fn edge_config(&self) -> EdgeConfig {
        EdgeConfig {
            combinator: "debounce",
            wait: self.wait,
            leading: self.leading,
            trailing: self.trailing,
            max_wait: self.max_wait,
            max_timer: true,
        }
    }
}

/// Postpones a function until calls stop arriving for `wait`.
///
/// Each call restarts the quiet period; the invocation uses the arguments of the last
/// call. With `max_wait` set, a steady stream of calls still produces an invocation at
/// least once per `max_wait`.
pub struct Debounce<A, R> {
    core: Arc<EdgeCore<A, R>>,
}

impl<A, R> Clone for Debounce<A, R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A, R> Debounce<A, R>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Wraps `func`. Timers run on the Tokio runtime that is current here.
    pub fn new<F>(func: F, settings: DebounceSettings) -> Result<Self, ConfigError>
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

    /// Drops the pending call and both timers without invoking.
    pub fn cancel(&self) {
        self.core.cancel()
    }

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
    use crate::test_utils::{InvocationLog, assert_near};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_quiet_period() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder().wait(ms(100)).build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        for at in [0, 30, 60] {
            log.sleep_until(at).await;
            assert_eq!(debounced.call(at), None);
        }
        assert!(debounced.pending());
        log.sleep_until(500).await;

        let calls = log.entries();
        assert_eq!(calls.len(), 1, "{calls:?}");
        assert_near(calls[0].0, 160);
        assert_eq!(calls[0].1, 60);
        assert!(!debounced.pending());
        assert_eq!(debounced.call(600), Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_forces_invocation() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .max_wait(ms(300))
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        for at in (0..=450).step_by(50) {
            log.sleep_until(at).await;
            debounced.call(at);
        }
        log.sleep_until(1_000).await;

        let calls = log.entries();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert!(calls[0].0 <= 300, "max_wait ignored: {calls:?}");
        assert_near(calls[1].0, 550);
        assert_eq!(calls[1].1, 450);
    }

    #[tokio::test(start_paused = true)]
    async fn long_burst_never_exceeds_max_wait() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .max_wait(ms(300))
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        for at in (0..=2_000).step_by(70) {
            log.sleep_until(at).await;
            debounced.call(at);
        }
        log.sleep_until(3_000).await;

        let calls = log.entries();
        assert!(calls.len() >= 7, "{calls:?}");
        assert!(calls[0].0 <= 305, "{calls:?}");
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 <= 305, "max_wait overshot: {calls:?}");
        }
        let (at, args) = calls[calls.len() - 1];
        assert_near(at, 2_060);
        assert_eq!(args, 1_960);
    }

    #[tokio::test(start_paused = true)]
    async fn call_past_max_wait_invokes_immediately() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .max_wait(ms(50))
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        // 50: max-wait timer fires with 40. 100: quiet timer hits the ceiling with 80.
        // 160: the call itself finds the ceiling passed while the timer armed at 120 waits.
        let mut returned = Vec::new();
        for at in (0..=160).step_by(40) {
            log.sleep_until(at).await;
            returned.push(debounced.call(at));
        }

        assert_eq!(returned.last(), Some(&Some(160)));
        assert!(debounced.pending());
        let args: Vec<u64> = log.entries().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, vec![40, 80, 160]);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_edge_then_trailing() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .leading(true)
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        for at in [0, 30, 60] {
            log.sleep_until(at).await;
            assert_eq!(debounced.call(at), Some(0));
        }
        log.sleep_until(500).await;

        let calls = log.entries();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert_eq!(calls[0], (0, 0));
        assert_near(calls[1].0, 160);
        assert_eq!(calls[1].1, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_only() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .leading(true)
            .trailing(false)
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        for at in [0, 30, 60] {
            log.sleep_until(at).await;
            debounced.call(at);
        }
        log.sleep_until(500).await;

        let args: Vec<u64> = log.entries().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_both_timers() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .max_wait(ms(150))
            .build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        debounced.call(0);
        log.sleep_until(50).await;
        debounced.call(50);
        debounced.cancel();
        debounced.cancel();
        assert!(!debounced.pending());

        log.sleep_until(1_000).await;
        assert!(log.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_invokes_latest_arguments() {
        let log = InvocationLog::new();
        let settings = DebounceSettings::builder().wait(ms(100)).build();
        let debounced = Debounce::new(log.recorder(), settings).unwrap();

        debounced.call(1);
        debounced.call(2);
        assert_eq!(debounced.flush(), Some(2));
        assert!(!debounced.pending());

        log.sleep_until(500).await;
        assert_eq!(log.entries(), vec![(0, 2)]);
    }

    #[tokio::test]
    async fn rejects_zero_max_wait() {
        let settings = DebounceSettings::builder()
            .wait(ms(100))
            .max_wait(Duration::ZERO)
            .build();
        let result = Debounce::new(|_: ()| (), settings);
        assert!(matches!(
            result,
            Err(ConfigError::ZeroDuration { name: "max_wait" })
        ));
    }

    #[test]
    fn settings_from_json() {
        let settings: DebounceSettings =
            serde_json::from_str(r#"{ "wait": 300, "max_wait": 1000 }"#).unwrap();
        assert_eq!(settings.get_wait(), ms(300));
        assert_eq!(settings.get_max_wait(), Some(ms(1_000)));
        assert!(!settings.leading);
        assert!(settings.trailing);

        let settings: DebounceSettings = serde_json::from_str(r#"{ "wait": 300 }"#).unwrap();
        assert_eq!(settings.get_max_wait(), None);
    }
}
