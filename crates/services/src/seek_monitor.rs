use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;

use course_core::seek::SeekAnomalyDetector;

use crate::config::TrackerConfig;
use crate::task::ScheduledTask;

/// Polled view of an external media player.
pub trait MediaPositionSource: Send + Sync {
    /// Current playback position in seconds, `None` while the player is not ready.
    fn current_position(&self) -> Option<f64>;
}

struct SeekShared {
    detector: Mutex<SeekAnomalyDetector>,
    warning: watch::Sender<bool>,
    warning_duration: Duration,
    clear_timer: Mutex<Option<ScheduledTask>>,
    anomalies: AtomicUsize,
}

impl SeekShared {
    fn poll(self: &Arc<Self>, source: &dyn MediaPositionSource) {
        let Some(position) = source.current_position() else {
            return;
        };
        let anomaly = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(position);
        if let Some(anomaly) = anomaly {
            tracing::warn!(from = anomaly.from, to = anomaly.to, "forward seek detected");
            self.raise();
        }
    }

    fn raise(self: &Arc<Self>) {
        self.anomalies.fetch_add(1, Ordering::SeqCst);
        self.warning.send_replace(true);

        let shared: Weak<Self> = Arc::downgrade(self);
        let clear = ScheduledTask::after("seek-warning-clear", self.warning_duration, async move {
            if let Some(shared) = shared.upgrade() {
                shared.warning.send_replace(false);
            }
        });
        // Replacing the previous timer restarts the display window.
        *self
            .clear_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(clear);
    }
}

/// Flags forward scrubbing on a video by polling the player position.
///
/// The warning it raises is informational; playback is never blocked.
pub struct SeekMonitor {
    shared: Arc<SeekShared>,
    poll: Option<ScheduledTask>,
}

impl SeekMonitor {
    /// Start polling `source` at the configured cadence.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn start(source: Arc<dyn MediaPositionSource>, config: &TrackerConfig) -> Self {
        let (warning, _rx) = watch::channel(false);
        let shared = Arc::new(SeekShared {
            detector: Mutex::new(SeekAnomalyDetector::new(config.seek_tolerance_secs)),
            warning,
            warning_duration: config.seek_warning_duration,
            clear_timer: Mutex::new(None),
            anomalies: AtomicUsize::new(0),
        });

        let poller = Arc::clone(&shared);
        let poll = ScheduledTask::every("seek-poll", config.seek_poll_interval, move || {
            poller.poll(source.as_ref());
            std::future::ready(ControlFlow::Continue(()))
        });

        Self {
            shared,
            poll: Some(poll),
        }
    }

    /// Receiver that is `true` while the seek warning should be shown.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.warning.subscribe()
    }

    #[must_use]
    pub fn warning_active(&self) -> bool {
        *self.shared.warning.borrow()
    }

    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.shared.anomalies.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.poll.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Forget the last sampled position, e.g. after the app itself moved the
    /// playhead to the resume position. The next sample becomes the baseline.
    pub fn rebase(&self) {
        self.shared
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    /// Stop polling, clear the warning and release the position source.
    pub fn stop(&mut self) {
        if self.poll.take().is_some() {
            tracing::debug!("seek monitor stopped");
        }
        self.shared
            .clear_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared.warning.send_replace(false);
    }
}

impl Drop for SeekMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Plays back a fixed list of samples, then reports "not ready".
    struct ScriptedPlayer {
        samples: Mutex<VecDeque<Option<f64>>>,
    }

    impl ScriptedPlayer {
        fn new(samples: impl IntoIterator<Item = Option<f64>>) -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(samples.into_iter().collect()),
            })
        }
    }

    impl MediaPositionSource for ScriptedPlayer {
        fn current_position(&self) -> Option<f64> {
            self.samples.lock().unwrap().pop_front().flatten()
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn flags_jump_once_and_clears_after_warning_window() {
        let player = ScriptedPlayer::new([0.0, 1.0, 2.0, 10.0, 11.0].map(Some));
        let monitor = SeekMonitor::start(player, &TrackerConfig::default());

        sleep_ms(3_500).await;
        assert_eq!(monitor.anomaly_count(), 0);
        assert!(!monitor.warning_active());

        // 4th poll reads 10.0
        sleep_ms(1_000).await;
        assert_eq!(monitor.anomaly_count(), 1);
        assert!(monitor.warning_active());

        sleep_ms(1_000).await;
        assert_eq!(monitor.anomaly_count(), 1);
        assert!(monitor.warning_active());

        // warning raised at 4s, cleared at 7s
        sleep_ms(2_000).await;
        assert!(!monitor.warning_active());
        assert_eq!(monitor.anomaly_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_ticks_leave_the_baseline_alone() {
        let player = ScriptedPlayer::new([Some(0.0), None, Some(1.5), None, Some(3.0)]);
        let monitor = SeekMonitor::start(player, &TrackerConfig::default());

        sleep_ms(6_000).await;
        assert_eq!(monitor.anomaly_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rebase_accepts_a_programmatic_jump() {
        let player = ScriptedPlayer::new([0.0, 1.0, 120.0, 121.0].map(Some));
        let monitor = SeekMonitor::start(player, &TrackerConfig::default());

        sleep_ms(2_500).await;
        monitor.rebase();
        sleep_ms(2_000).await;
        assert_eq!(monitor.anomaly_count(), 0);
        assert!(!monitor.warning_active());
    }

    #[tokio::test(start_paused = true)]
    async fn wider_tolerance_lets_small_skips_through() {
        let player = ScriptedPlayer::new([0.0, 1.0, 6.0, 30.0].map(Some));
        let config = TrackerConfig::default().with_seek_tolerance(10.0);
        let monitor = SeekMonitor::start(player, &config);

        sleep_ms(3_500).await;
        assert_eq!(monitor.anomaly_count(), 0);
        sleep_ms(1_000).await;
        assert_eq!(monitor.anomaly_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_warning_transitions() {
        let player = ScriptedPlayer::new([Some(0.0), Some(30.0)]);
        let monitor = SeekMonitor::start(player, &TrackerConfig::default());
        let mut rx = monitor.subscribe();

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_the_source() {
        let player = ScriptedPlayer::new([Some(0.0), Some(30.0)]);
        let source: Arc<dyn MediaPositionSource> = player.clone();
        let mut monitor = SeekMonitor::start(source, &TrackerConfig::default());
        assert_eq!(Arc::strong_count(&player), 2);

        sleep_ms(2_500).await;
        assert!(monitor.warning_active());

        monitor.stop();
        sleep_ms(10).await;
        assert!(!monitor.is_running());
        assert!(!monitor.warning_active());
        assert_eq!(Arc::strong_count(&player), 1);
    }
}
