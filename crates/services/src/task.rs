use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// A spawned timer task that is cancelled when dropped.
///
/// Every timer owned by a lesson or attempt lives in one of these, so tearing
/// down the owner is enough to stop its ticks.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first one period after spawning, until it
    /// returns `ControlFlow::Break` or the task is cancelled.
    ///
    /// A tick that takes longer than `period` delays the next one instead of
    /// bursting to catch up.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    tracing::trace!(task = name, "scheduled task finished");
                    break;
                }
            }
        });
        Self { name, handle }
    }

    /// Run `future` once after `delay`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn after<Fut>(name: &'static str, delay: Duration, future: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            future.await;
        });
        Self { name, handle }
    }

    /// Run `future` once, right away.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn<Fut>(name: &'static str, future: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>, stop_at: usize) -> ScheduledTask {
        let count = Arc::clone(count);
        ScheduledTask::every("counter", Duration::from_secs(1), move || {
            let count = Arc::clone(&count);
            async move {
                let seen = count.fetch_add(1, Ordering::SeqCst) + 1;
                if seen >= stop_at {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let _task = counting(&count, usize::MAX);

        time::sleep(Duration::from_millis(900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn break_stops_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting(&count, 3);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = counting(&count, usize::MAX);

        time::sleep(Duration::from_millis(2500)).await;
        drop(task);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn after_runs_once_past_the_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let task = ScheduledTask::after("once", Duration::from_secs(3), async move {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.name(), "once");

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
