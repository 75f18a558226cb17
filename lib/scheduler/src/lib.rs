//! Timed suspension and cancellable delayed tasks.
//!
//! The scheduler provides the two timing primitives the workflow engine
//! needs:
//!
//! - [`Scheduler::wait`]: suspends the calling task for a duration without
//!   blocking any other execution (used by `wait` nodes).
//! - [`Scheduler::schedule`]: runs a callback after a delay unless the
//!   returned [`ScheduledTask`] is cancelled first.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Provides non-blocking timed suspension and cancellable delayed callbacks.
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Creates a new scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Suspends the calling task for the given duration.
    ///
    /// Only the awaiting task sleeps; other tasks on the runtime continue
    /// to make progress.
    pub async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Schedules `task` to run after `delay`.
    ///
    /// The callback fires on a spawned task unless the returned handle is
    /// cancelled first. Dropping the handle does not cancel the task.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        ScheduledTask { handle }
    }
}

/// Handle to a scheduled callback.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancels the task. A callback that has already started is not
    /// interrupted retroactively; one that is still waiting never fires.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns true once the task has fired or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn wait_suspends_for_at_least_the_duration() {
        let scheduler = Scheduler::new();
        let started = Instant::now();
        scheduler.wait(Duration::from_millis(50)).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn wait_does_not_block_other_tasks() {
        let scheduler = Arc::new(Scheduler::new());

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler.wait(Duration::from_millis(200)).await;
            })
        };

        // A short wait completes while the long one is still pending.
        scheduler.wait(Duration::from_millis(20)).await;
        assert!(!background.is_finished());
        background.abort();
    }

    #[tokio::test]
    async fn scheduled_task_fires_after_delay() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let task = scheduler.schedule(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn cancelled_task_never_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let task = scheduler.schedule(Duration::from_millis(30), move || {
            flag.store(true, Ordering::SeqCst);
        });

        task.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
