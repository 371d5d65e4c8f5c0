use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Owned handle to a repeating task.
///
/// Cancelling (or dropping the handle) stops future ticks. A tick that is
/// already running is left to complete.
#[derive(Debug)]
pub struct TimerHandle {
    name: &'static str,
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `tick` every `period`, first firing one period from now.
    ///
    /// Each tick is awaited before the next is scheduled, so ticks of one
    /// timer never overlap. Returns `None` for a zero period.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Option<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return None;
        }

        let cancel = Arc::new(Notify::new());
        let cancelled = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // Only the wait between ticks is interruptible
                tokio::select! {
                    biased;
                    _ = cancelled.notified() => break,
                    _ = interval.tick() => {}
                }
                trace!("{} timer fired", name);
                tick().await;
            }
            trace!("{} timer stopped", name);
        });

        Some(Self { name, cancel, task })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // notify_one stores a permit if the task is mid-tick
        self.cancel.notify_one();
    }
}
